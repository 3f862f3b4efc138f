//! Domain descriptors.
//!
//! A symbol lives on an ordered list of primary domain names and, optionally,
//! on auxiliary levels (`secondary`, `tertiary`, `quaternary`) that repeat the
//! primary layout once per auxiliary mesh point.

use crate::ir::error::{IrError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainLevel {
    Primary,
    Secondary,
    Tertiary,
    Quaternary,
}

impl DomainLevel {
    pub const ALL: [DomainLevel; 4] = [
        DomainLevel::Primary,
        DomainLevel::Secondary,
        DomainLevel::Tertiary,
        DomainLevel::Quaternary,
    ];

    pub const AUXILIARY: [DomainLevel; 3] = [
        DomainLevel::Secondary,
        DomainLevel::Tertiary,
        DomainLevel::Quaternary,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DomainLevel::Primary => "primary",
            DomainLevel::Secondary => "secondary",
            DomainLevel::Tertiary => "tertiary",
            DomainLevel::Quaternary => "quaternary",
        }
    }

    /// The level one step further from primary, if any.
    pub fn up(&self) -> Option<DomainLevel> {
        match self {
            DomainLevel::Primary => Some(DomainLevel::Secondary),
            DomainLevel::Secondary => Some(DomainLevel::Tertiary),
            DomainLevel::Tertiary => Some(DomainLevel::Quaternary),
            DomainLevel::Quaternary => None,
        }
    }
}

impl fmt::Display for DomainLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Domains {
    #[serde(default)]
    pub primary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tertiary: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quaternary: Vec<String>,
}

impl Domains {
    /// Domains with only a primary level.
    pub fn primary<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            primary: names.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_level<I, S>(mut self, level: DomainLevel, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.level_mut(level) = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn get(&self, level: DomainLevel) -> &[String] {
        match level {
            DomainLevel::Primary => &self.primary,
            DomainLevel::Secondary => &self.secondary,
            DomainLevel::Tertiary => &self.tertiary,
            DomainLevel::Quaternary => &self.quaternary,
        }
    }

    fn level_mut(&mut self, level: DomainLevel) -> &mut Vec<String> {
        match level {
            DomainLevel::Primary => &mut self.primary,
            DomainLevel::Secondary => &mut self.secondary,
            DomainLevel::Tertiary => &mut self.tertiary,
            DomainLevel::Quaternary => &mut self.quaternary,
        }
    }

    /// True when the symbol has no domain at any level.
    pub fn is_empty(&self) -> bool {
        DomainLevel::ALL.iter().all(|level| self.get(*level).is_empty())
    }

    /// Non-empty auxiliary levels, nearest to primary first.
    pub fn auxiliary(&self) -> impl Iterator<Item = (DomainLevel, &[String])> {
        DomainLevel::AUXILIARY
            .into_iter()
            .map(move |level| (level, self.get(level)))
            .filter(|(_, names)| !names.is_empty())
    }

    pub fn has_auxiliary(&self) -> bool {
        self.auxiliary().next().is_some()
    }

    /// Push every level one step away from primary and install `primary`.
    ///
    /// Fails if the quaternary level is occupied, since there is nowhere left
    /// to move it.
    pub fn shifted_up(&self, primary: Vec<String>) -> Result<Domains> {
        if !self.quaternary.is_empty() {
            return Err(IrError::Domain(format!(
                "cannot broadcast onto {:?}: quaternary domain {:?} is already in use",
                primary, self.quaternary
            )));
        }
        let mut out = Domains {
            primary,
            ..Default::default()
        };
        for level in [DomainLevel::Primary, DomainLevel::Secondary, DomainLevel::Tertiary] {
            if let Some(target) = level.up() {
                *out.level_mut(target) = self.get(level).to_vec();
            }
        }
        Ok(out)
    }

    /// Domains of a binary operation: either side may be domain-less, two
    /// populated sides must agree.
    pub fn merge_binary(left: &Domains, right: &Domains) -> Result<Domains> {
        if left.is_empty() {
            return Ok(right.clone());
        }
        if right.is_empty() || left == right {
            return Ok(left.clone());
        }
        Err(IrError::Domain(format!(
            "children must have the same domains, got {} and {}",
            left, right
        )))
    }

    /// Merge the domains of concatenation children.
    ///
    /// Every child must own some primary domain, primary domains must be
    /// pairwise disjoint, and each auxiliary level must either be empty or
    /// identical across children. The primary sequence of the result is the
    /// children's primaries joined in order; auxiliary levels come from the
    /// first child that populates them.
    pub fn concatenate<'a, I>(children: I) -> Result<Domains>
    where
        I: IntoIterator<Item = &'a Domains>,
    {
        let children: Vec<&Domains> = children.into_iter().collect();
        let mut merged = Domains::default();

        for (idx, child) in children.iter().enumerate() {
            if child.primary.is_empty() {
                return Err(IrError::Domain(format!(
                    "Cannot concatenate child {} with empty domain",
                    idx
                )));
            }
            if child.primary.iter().any(|dom| merged.primary.contains(dom)) {
                return Err(IrError::Domain(
                    "domain of children must be disjoint".to_string(),
                ));
            }
            merged.primary.extend(child.primary.iter().cloned());
        }

        for level in DomainLevel::AUXILIARY {
            let Some(reference) = children
                .iter()
                .map(|child| child.get(level))
                .find(|names| !names.is_empty())
            else {
                continue;
            };
            let compatible = children.iter().all(|child| {
                let names = child.get(level);
                names.is_empty() || names == reference
            });
            if !compatible {
                return Err(IrError::Domain(format!(
                    "children must have same or empty {} domains",
                    level
                )));
            }
            *merged.level_mut(level) = reference.to_vec();
        }

        Ok(merged)
    }
}

impl fmt::Display for Domains {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{primary: {:?}", self.primary)?;
        for (level, names) in self.auxiliary() {
            write!(f, ", {}: {:?}", level, names)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concatenate_preserves_order() {
        let a = Domains::primary(["negative electrode"]);
        let b = Domains::primary(["separator"]);
        let c = Domains::primary(["positive electrode"]);
        let merged = Domains::concatenate([&a, &b, &c]).expect("disjoint domains");
        assert_eq!(
            merged.primary,
            vec!["negative electrode", "separator", "positive electrode"]
        );
    }

    #[test]
    fn test_concatenate_rejects_overlap() {
        let a = Domains::primary(["negative electrode", "separator"]);
        let b = Domains::primary(["separator"]);
        let err = Domains::concatenate([&a, &b]).unwrap_err();
        assert!(matches!(err, IrError::Domain(_)));
    }

    #[test]
    fn test_concatenate_rejects_empty_child() {
        let a = Domains::primary(["separator"]);
        let b = Domains::default();
        let err = Domains::concatenate([&a, &b]).unwrap_err();
        assert_eq!(
            err,
            IrError::Domain("Cannot concatenate child 1 with empty domain".to_string())
        );
    }

    #[test]
    fn test_auxiliary_inherited_from_first_populated_child() {
        let a = Domains::primary(["negative particle"]);
        let b = Domains::primary(["positive particle"])
            .with_level(DomainLevel::Secondary, ["current collector"]);
        let merged = Domains::concatenate([&a, &b]).expect("compatible");
        assert_eq!(merged.secondary, vec!["current collector"]);
    }

    #[test]
    fn test_auxiliary_mismatch() {
        let a = Domains::primary(["negative particle"])
            .with_level(DomainLevel::Secondary, ["negative electrode"]);
        let b = Domains::primary(["positive particle"])
            .with_level(DomainLevel::Secondary, ["positive electrode"]);
        let err = Domains::concatenate([&a, &b]).unwrap_err();
        assert!(matches!(err, IrError::Domain(_)));
    }

    #[test]
    fn test_shifted_up() {
        let d = Domains::primary(["negative electrode"])
            .with_level(DomainLevel::Secondary, ["current collector"]);
        let shifted = d
            .shifted_up(vec!["negative particle".to_string()])
            .expect("room to shift");
        assert_eq!(shifted.primary, vec!["negative particle"]);
        assert_eq!(shifted.secondary, vec!["negative electrode"]);
        assert_eq!(shifted.tertiary, vec!["current collector"]);
    }

    #[test]
    fn test_merge_binary() {
        let a = Domains::primary(["separator"]);
        let none = Domains::default();
        assert_eq!(Domains::merge_binary(&none, &a), Ok(a.clone()));
        let b = Domains::primary(["negative electrode"]);
        assert!(Domains::merge_binary(&a, &b).is_err());
    }
}
