//! Built-in tools

mod swiss_army_knife;

pub use swiss_army_knife::{SwissArmyKnifeTool, TOOL_NAME};
