//! Point counts per named domain.
//!
//! The concatenation layer only ever asks the mesh one question: how many
//! points does a named domain have? Everything else about the geometry lives
//! with the spatial discretisation and is out of scope here.

use crate::ir::error::{IrError, Result};
use ordermap::OrderMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubMesh {
    pub npts: usize,
}

/// Read-only map of domain name to submesh, in insertion order.
///
/// Deserialises from a JSON object such as
/// `{"negative electrode": {"npts": 5}, "separator": {"npts": 3}}`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mesh {
    submeshes: OrderMap<String, SubMesh>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion, handy for tests and small models.
    pub fn with_domain(mut self, domain: &str, npts: usize) -> Self {
        self.insert(domain, npts);
        self
    }

    pub fn insert(&mut self, domain: &str, npts: usize) {
        self.submeshes.insert(domain.to_string(), SubMesh { npts });
    }

    pub fn npts(&self, domain: &str) -> Result<usize> {
        self.submeshes
            .get(domain)
            .map(|submesh| submesh.npts)
            .ok_or_else(|| IrError::UnknownDomain(domain.to_string()))
    }

    /// Total number of points across a list of domains.
    pub fn npts_for(&self, domains: &[String]) -> Result<usize> {
        domains.iter().try_fold(0, |acc, dom| Ok(acc + self.npts(dom)?))
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.submeshes.keys().map(String::as_str)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

impl<S: AsRef<str>> FromIterator<(S, usize)> for Mesh {
    fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
        let mut mesh = Mesh::new();
        for (domain, npts) in iter {
            mesh.insert(domain.as_ref(), npts);
        }
        mesh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_npts_lookup() {
        let mesh = Mesh::new().with_domain("separator", 3);
        assert_eq!(mesh.npts("separator"), Ok(3));
        assert_eq!(
            mesh.npts("anode"),
            Err(IrError::UnknownDomain("anode".to_string()))
        );
    }

    #[test]
    fn test_from_json_keeps_order() {
        let mesh = Mesh::from_json(
            r#"{"negative electrode": {"npts": 5}, "separator": {"npts": 3}}"#,
        )
        .expect("valid mesh json");
        let names: Vec<&str> = mesh.domains().collect();
        assert_eq!(names, vec!["negative electrode", "separator"]);
        assert_eq!(
            mesh.npts_for(&["negative electrode".to_string(), "separator".to_string()]),
            Ok(8)
        );
    }
}
