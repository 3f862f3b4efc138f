use super::ast::{BroadcastKind, Symbol, SymbolKind};
use super::visitor::Visitor;

/// Builds the display string of a tree bottom-up.
///
/// Each `exit_symbol` pops the already rendered children off the stack and
/// pushes the rendering of the node itself, so after a full traversal the
/// stack holds exactly the root's text.
#[derive(Default)]
pub struct ReprVisitor {
    stack: Vec<String>,
}

impl ReprVisitor {
    pub fn repr(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }
}

impl<'s> Visitor<'s> for ReprVisitor {
    fn exit_symbol(&mut self, n: &'s Symbol) {
        let arity = n.children().len();
        let split = self.stack.len().saturating_sub(arity);
        let children = self.stack.split_off(split);

        let s = match n.kind() {
            SymbolKind::Scalar(v) => format!("{}", v),
            SymbolKind::Vector(a) => format!("vector(len={})", a.nrows()),
            SymbolKind::Matrix(m) => {
                let (rows, cols) = m.shape();
                let storage = if m.is_sparse() { "sparse" } else { "dense" };
                format!("{} matrix({}x{})", storage, rows, cols)
            }
            SymbolKind::StateVector(_)
            | SymbolKind::Variable(_)
            | SymbolKind::InputParameter(_) => n.name().to_string(),
            SymbolKind::Time => "t".to_string(),
            SymbolKind::Broadcast { kind, .. } => {
                let prefix = match kind {
                    BroadcastKind::Primary => "broadcast",
                    BroadcastKind::Full => "full_broadcast",
                };
                format!("{}({})", prefix, children.join(", "))
            }
            SymbolKind::Binary { op, .. } => {
                format!("({})", children.join(&format!(" {} ", op.symbol())))
            }
            SymbolKind::Index { rows, .. } => {
                format!("{}[{}:{}]", children.join(""), rows.start, rows.end)
            }
            SymbolKind::Concatenation(_) => format!("{}({})", n.name(), children.join(", ")),
        };
        self.stack.push(s);
    }
}

#[cfg(test)]
mod tests {
    use crate::ir::ast::{BinaryOp, Symbol};

    #[test]
    fn test_binary_repr() {
        let expr = Symbol::binary(BinaryOp::Add, Symbol::time(), Symbol::scalar(2.0))
            .expect("domainless operands");
        assert_eq!(expr.to_string(), "(t + 2)");
    }

    #[test]
    fn test_state_vector_index_repr() {
        let sv = Symbol::state_vector(vec![0..4]).expect("valid slice");
        let idx = Symbol::index(sv, 1..2).expect("valid range");
        assert_eq!(idx.to_string(), "y[0:4][1:2]");
    }
}
