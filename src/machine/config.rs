/// Region capacities, in words. The machine allocates each region once
/// at these sizes and treats overflow as a fatal error; it never grows
/// a stack mid-derivation.
#[derive(Debug, Clone, Copy)]
pub struct MachineConfig {
    pub global_capacity: usize,
    pub local_capacity: usize,
    pub trail_capacity: usize,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig {
            global_capacity: 1 << 20,
            local_capacity: 1 << 20,
            trail_capacity: 1 << 16,
        }
    }
}

impl MachineConfig {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_global_capacity(mut self, words: usize) -> Self {
        self.global_capacity = words;
        self
    }

    pub fn with_local_capacity(mut self, words: usize) -> Self {
        self.local_capacity = words;
        self
    }

    pub fn with_trail_capacity(mut self, words: usize) -> Self {
        self.trail_capacity = words;
        self
    }
}
