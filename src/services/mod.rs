pub mod actions;
pub mod debounce;
pub mod detection;
pub mod display;
pub mod layout;
pub mod listeners;
pub mod reconfigure;
pub mod rules;
pub mod sources;

pub use actions::{create_dispatcher, LayoutAction};
pub use detection::{BootstrapGate, DetectionAggregator};
pub use display::{SharedDisplay, X11Display};
pub use listeners::ListenerRegistry;
pub use sources::create_sources;
