//! Read-only traversal of a symbol tree.
//!
//! `accept` calls `enter_symbol` on the way down and `exit_symbol` on the way
//! back up, visiting children in order.

use crate::ir::ast::Symbol;

#[allow(unused_variables)]
pub trait Visitor<'s> {
    fn enter_symbol(&mut self, symbol: &'s Symbol) {}
    fn exit_symbol(&mut self, symbol: &'s Symbol) {}
}

pub trait Visitable<'s> {
    fn accept<V: Visitor<'s> + ?Sized>(&'s self, visitor: &mut V);
}

impl<'s> Visitable<'s> for Symbol {
    fn accept<V: Visitor<'s> + ?Sized>(&'s self, visitor: &mut V) {
        visitor.enter_symbol(self);
        for child in self.children() {
            child.accept(&mut *visitor);
        }
        visitor.exit_symbol(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::ast::BinaryOp;

    #[derive(Default)]
    struct DepthCounter {
        level: usize,
        max_level: usize,
    }

    impl<'s> Visitor<'s> for DepthCounter {
        fn enter_symbol(&mut self, _symbol: &'s Symbol) {
            self.level += 1;
            self.max_level = self.max_level.max(self.level);
        }

        fn exit_symbol(&mut self, _symbol: &'s Symbol) {
            self.level -= 1;
        }
    }

    #[test]
    fn test_enter_exit_balance() {
        let inner = Symbol::binary(BinaryOp::Add, Symbol::scalar(1.0), Symbol::time())
            .expect("domainless operands");
        let outer = Symbol::binary(BinaryOp::Multiply, inner, Symbol::scalar(2.0))
            .expect("domainless operands");
        let mut counter = DepthCounter::default();
        outer.accept(&mut counter);
        assert_eq!(counter.level, 0);
        assert_eq!(counter.max_level, 3);
    }
}
