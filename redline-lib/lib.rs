use smartstring::{LazyCompact, SmartString};

pub mod anchor;
pub mod correction;
pub mod dedupe;
pub mod engine;
pub mod locate;
pub mod merge;
pub mod navigate;
pub mod rebase;
pub mod span;

pub type Tendril = SmartString<LazyCompact>;
