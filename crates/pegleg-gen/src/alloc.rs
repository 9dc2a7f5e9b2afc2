use cranelift_entity::EntityRef;
use pegleg::ast::{Expr, ExprKind, Grammar, Params, Slot};

/// Slot pool of a single rule function.
///
/// Slots are handed out first-fit among those whose reference count dropped
/// to zero, so disjoint lifetimes share storage. Labels hold an extra
/// reference for as long as their scope is open.
#[derive(Default)]
struct Allocator {
    ref_counts: Vec<u32>,
    scopes: Vec<Vec<(String, Slot)>>,
}

impl Allocator {
    fn reset(&mut self) {
        self.ref_counts.clear();
        self.scopes.clear();
    }

    fn alloc(&mut self) -> Slot {
        let index = match self.ref_counts.iter().position(|&count| count == 0) {
            Some(index) => {
                self.ref_counts[index] = 1;
                index
            }
            None => {
                self.ref_counts.push(1);
                self.ref_counts.len() - 1
            }
        };
        Slot::new(index)
    }

    fn use_slot(&mut self, slot: Slot) {
        self.ref_counts[slot.index()] += 1;
    }

    fn release(&mut self, slot: Slot) {
        let count = &mut self.ref_counts[slot.index()];
        *count = count.saturating_sub(1);
    }

    fn count(&self) -> usize {
        self.ref_counts.len()
    }

    fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    fn pop_scope(&mut self) {
        let scope = self.scopes.pop().expect("Unbalanced scope stack");
        for (_, slot) in scope {
            self.release(slot);
        }
    }

    fn add_label(&mut self, label: &str, slot: Slot) {
        self.use_slot(slot);
        let scope = self.scopes.last_mut().expect("Label outside of any scope");
        match scope.iter_mut().find(|(name, _)| name == label) {
            Some(entry) => {
                let old = std::mem::replace(&mut entry.1, slot);
                self.release(old);
            }
            None => scope.push((label.to_owned(), slot)),
        }
    }

    /// Labels visible at this point, outer scopes first. An inner label
    /// shadows an outer one of the same name while keeping its position.
    fn visible(&self) -> Params {
        let mut params: Params = Vec::new();
        for (name, slot) in self.scopes.iter().flatten() {
            match params.iter_mut().find(|(existing, _)| existing == name) {
                Some(entry) => entry.1 = *slot,
                None => params.push((name.clone(), *slot)),
            }
        }
        params
    }

    fn scoped(&mut self, expr: &mut Expr, result: Slot) {
        self.push_scope();
        self.compute(expr, result);
        self.pop_scope();
    }

    fn compute(&mut self, expr: &mut Expr, result: Slot) {
        let needs_pos = matches!(
            expr.kind,
            ExprKind::Action { .. }
                | ExprKind::Sequence(_)
                | ExprKind::SimpleAnd(_)
                | ExprKind::SimpleNot(_)
        );
        let pos = needs_pos.then(|| self.alloc());

        expr.result = Some(result);
        expr.pos = pos;

        match &mut expr.kind {
            ExprKind::Named { expression, .. } => self.compute(expression, result),
            ExprKind::Choice(alternatives) => {
                for alternative in alternatives {
                    self.scoped(alternative, result);
                }
            }
            ExprKind::Action {
                expression, params, ..
            } => {
                self.push_scope();
                self.compute(expression, result);
                *params = self.visible();
                self.pop_scope();
            }
            ExprKind::Sequence(elements) => {
                let slots = elements
                    .iter_mut()
                    .map(|element| {
                        let slot = self.alloc();
                        self.compute(element, slot);
                        slot
                    })
                    .collect::<Vec<_>>();
                for slot in slots {
                    self.release(slot);
                }
            }
            ExprKind::Labeled { label, expression } => {
                self.scoped(expression, result);
                self.add_label(label, result);
            }
            ExprKind::SimpleAnd(expression)
            | ExprKind::SimpleNot(expression)
            | ExprKind::Optional(expression) => self.scoped(expression, result),
            ExprKind::SemanticAnd { params, .. } | ExprKind::SemanticNot { params, .. } => {
                *params = self.visible();
            }
            ExprKind::ZeroOrMore(expression) | ExprKind::OneOrMore(expression) => {
                let item = self.alloc();
                self.scoped(expression, item);
                self.release(item);
            }
            ExprKind::RuleRef(_) | ExprKind::Literal { .. } | ExprKind::Class(_) | ExprKind::Any => {}
        }

        if let Some(pos) = pos {
            self.release(pos);
        }
    }
}

/// Assigns result and position slots to every node and records the slot
/// count of each rule along with the labels visible to every piece of code.
pub fn allocate(grammar: &mut Grammar) {
    let mut allocator = Allocator::default();
    for rule in &mut grammar.rules {
        allocator.reset();

        let result = allocator.alloc();
        allocator.scoped(&mut rule.expression, result);
        allocator.release(result);

        rule.register_count = allocator.count();
        log::trace!("rule {} uses {} registers", rule.name, rule.register_count);
    }
}
