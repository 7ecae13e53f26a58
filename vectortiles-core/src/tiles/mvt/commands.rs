//! MVT command/parameter integer helpers, mirroring geozero's private `mvt_commands` module.

/// Command to be executed and the number of times that the command will be executed
/// <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#431-command-integers>
pub struct CommandInteger(pub u32);

#[derive(Debug)]
pub enum Command {
    MoveTo = 1,
    LineTo = 2,
    ClosePath = 7,
}

impl CommandInteger {
    pub fn from(id: Command, count: u32) -> u32 {
        ((id as u32) & 0x7) | (count << 3)
    }
    pub fn id(&self) -> u32 {
        self.0 & 0x7
    }
    pub fn count(&self) -> u32 {
        self.0 >> 3
    }
}

/// Commands requiring parameters are followed by a `ParameterInteger` for each parameter required by that command
/// <https://github.com/mapbox/vector-tile-spec/tree/master/2.1#432-parameter-integers>
pub struct ParameterInteger(pub u32);

impl ParameterInteger {
    pub fn from(value: i32) -> u32 {
        ((value << 1) ^ (value >> 31)) as u32
    }
    pub fn value(&self) -> i32 {
        ((self.0 >> 1) as i32) ^ (-((self.0 & 1) as i32))
    }
}
