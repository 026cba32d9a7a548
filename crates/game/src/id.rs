use std::fmt;

/// Names a player or entity slot. The generation changes every time a slot
/// is reused, so a stale identifier never matches the new occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Identifier {
    pub index: u16,
    pub generation: u16,
}

impl Identifier {
    pub const fn new(index: u16, generation: u16) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[derive(Debug)]
pub struct IdentifierAllocator {
    generations: Vec<u16>,
    free: Vec<u16>,
    live: usize,
}

impl Default for IdentifierAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentifierAllocator {
    pub fn new() -> Self {
        Self {
            generations: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Returns `None` once all `u16` slots are live.
    pub fn allocate(&mut self) -> Option<Identifier> {
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u16::try_from(self.generations.len()).ok()?;
                self.generations.push(0);
                index
            }
        };

        self.live += 1;
        Some(Identifier::new(index, self.generations[index as usize]))
    }

    pub fn release(&mut self, id: Identifier) -> bool {
        if !self.is_live(id) {
            return false;
        }

        let slot = &mut self.generations[id.index as usize];
        *slot = slot.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        true
    }

    pub fn is_live(&self, id: Identifier) -> bool {
        self.generations
            .get(id.index as usize)
            .is_some_and(|&generation| generation == id.generation)
            && !self.free.contains(&id.index)
    }

    pub fn live_count(&self) -> usize {
        self.live
    }
}
