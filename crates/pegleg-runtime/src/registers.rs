use serde_json::Value;

/// Contents of one local slot of a rule function.
///
/// A slot is reused across disjoint lifetimes, so over the course of a rule
/// it may hold a saved position and later a match result.
#[derive(Clone, Debug)]
pub enum Register<P> {
    Empty,
    Pos(P),
    /// `None` marks a failed match.
    Value(Option<Value>),
}

impl<P> Default for Register<P> {
    fn default() -> Self {
        Register::Empty
    }
}

/// The slot storage of a single rule invocation.
pub struct Registers<P> {
    slots: Vec<Register<P>>,
}

impl<P: Clone> Registers<P> {
    pub fn new(count: usize) -> Registers<P> {
        let mut slots = Vec::with_capacity(count);
        slots.resize_with(count, Register::default);
        Registers { slots }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn set_pos(&mut self, slot: usize, pos: P) {
        self.slots[slot] = Register::Pos(pos);
    }

    #[inline]
    pub fn pos(&self, slot: usize) -> P {
        match &self.slots[slot] {
            Register::Pos(pos) => pos.clone(),
            _ => panic!("Slot {slot} does not hold a position"),
        }
    }

    #[inline]
    pub fn set(&mut self, slot: usize, value: Option<Value>) {
        self.slots[slot] = Register::Value(value);
    }

    #[inline]
    pub fn is_match(&self, slot: usize) -> bool {
        matches!(self.slots[slot], Register::Value(Some(_)))
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&Value> {
        match &self.slots[slot] {
            Register::Value(value) => value.as_ref(),
            _ => None,
        }
    }

    /// Value of a labeled slot, `null` when the slot holds no match.
    #[inline]
    pub fn value(&self, slot: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.get(slot).unwrap_or(&NULL)
    }

    #[inline]
    pub fn take(&mut self, slot: usize) -> Option<Value> {
        match std::mem::take(&mut self.slots[slot]) {
            Register::Value(value) => value,
            _ => None,
        }
    }
}

#[test]
fn test_registers_reuse() {
    let mut regs = Registers::<usize>::new(2);
    assert_eq!(regs.len(), 2);

    regs.set_pos(0, 7);
    assert_eq!(regs.pos(0), 7);

    regs.set(0, Some(Value::from("x")));
    assert!(regs.is_match(0));
    assert_eq!(regs.value(0), &Value::from("x"));

    regs.set(1, None);
    assert!(!regs.is_match(1));
    assert_eq!(regs.value(1), &Value::Null);

    assert_eq!(regs.take(0), Some(Value::from("x")));
    assert_eq!(regs.get(0), None);
}
