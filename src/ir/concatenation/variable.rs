//! Concatenation of model variables.
//!
//! A variable concatenation behaves like a single variable spanning all of
//! its children's domains: it carries a merged name and print name, and the
//! scale, reference and bounds its children share.

use super::{build, get_children_domains, ConcatenationKind};
use crate::ir::ast::Symbol;
use crate::ir::error::{IrError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct VariableMeta {
    /// Merged display name; `None` when the children share no text.
    pub name: Option<String>,
    pub print_name: String,
    pub scale: f64,
    pub reference: f64,
    pub bounds: (f64, f64),
}

/// Longest common substring of `s1` and `s2`, trimmed of surrounding
/// whitespace. Among equally long matches the one starting first in `s1`
/// wins.
pub fn intersect(s1: &str, s2: &str) -> String {
    let a: Vec<char> = s1.chars().collect();
    let b: Vec<char> = s2.chars().collect();
    // run[j + 1] is the length of the common suffix of a[..=i] and b[..=j]
    let mut run = vec![0usize; b.len() + 1];
    let (mut best_len, mut best_end) = (0, 0);
    for (i, ca) in a.iter().enumerate() {
        for j in (0..b.len()).rev() {
            run[j + 1] = if *ca == b[j] { run[j] + 1 } else { 0 };
            if run[j + 1] > best_len {
                best_len = run[j + 1];
                best_end = i + 1;
            }
        }
    }
    a[best_end - best_len..best_end]
        .iter()
        .collect::<String>()
        .trim()
        .to_string()
}

fn intersect_all<'a>(mut names: impl Iterator<Item = &'a str>) -> String {
    let first = names.next().unwrap_or_default().to_string();
    names.fold(first, |acc, name| intersect(&acc, name))
}

/// Display name of the merged variable.
///
/// A match that begins inside a word in any of the names loses that leading
/// word fragment, and the first letter is upper-cased.
fn merge_names(names: &[&str]) -> Option<String> {
    let common = intersect_all(names.iter().copied());
    if common.is_empty() {
        return None;
    }
    let starts_mid_word = names.iter().any(|name| {
        name.find(&common)
            .and_then(|pos| name[..pos].chars().next_back())
            .is_some_and(char::is_alphanumeric)
    });
    let mut merged = common.as_str();
    if starts_mid_word {
        if let Some((_, rest)) = common.split_once(char::is_whitespace) {
            let rest = rest.trim_start();
            if !rest.is_empty() {
                merged = rest;
            }
        }
    }
    let mut chars = merged.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect())
}

/// Build a variable concatenation from children that are all variables.
pub(crate) fn concatenation_variable(children: Vec<Symbol>) -> Result<Symbol> {
    let mut variables = Vec::with_capacity(children.len());
    for child in &children {
        let variable = child.as_variable().ok_or_else(|| {
            IrError::Type(format!(
                "cannot build a variable concatenation from '{}', which is not a variable",
                child
            ))
        })?;
        variables.push(variable);
    }
    let [first, ..] = variables.as_slice() else {
        return Err(IrError::Value(
            "Cannot create empty concatenation".to_string(),
        ));
    };
    if variables.len() < 2 {
        return Err(IrError::Value(
            "a variable concatenation needs at least two children".to_string(),
        ));
    }
    if variables.iter().any(|v| v.scale != first.scale) {
        return Err(IrError::Value(
            "Cannot concatenate symbols with different scales".to_string(),
        ));
    }
    if variables.iter().any(|v| v.reference != first.reference) {
        return Err(IrError::Value(
            "Cannot concatenate symbols with different references".to_string(),
        ));
    }
    if variables.iter().any(|v| v.bounds != first.bounds) {
        return Err(IrError::Value(
            "Cannot concatenate symbols with different bounds".to_string(),
        ));
    }

    let names: Vec<&str> = children.iter().map(Symbol::name).collect();
    let name = merge_names(&names);
    let raw_print_names = children.iter().zip(&variables).map(|(child, variable)| {
        variable.print_name.as_deref().unwrap_or_else(|| child.name())
    });
    let print_name = intersect_all(raw_print_names);
    let print_name = print_name
        .strip_suffix('_')
        .unwrap_or(&print_name)
        .to_string();

    let meta = VariableMeta {
        name: name.clone(),
        print_name,
        scale: first.scale,
        reference: first.reference,
        bounds: first.bounds,
    };
    log::trace!("variable concatenation {:?} of {:?}", meta.name, names);
    let domains = get_children_domains(&children)?;
    Ok(build(
        ConcatenationKind::Variable(meta),
        name.as_deref().unwrap_or("concatenation"),
        children,
        domains,
    ))
}
