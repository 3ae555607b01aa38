mod command;
mod dispatcher;
mod dry_run;
mod layout;
mod r#trait;
mod template;
mod wallpaper;

pub use self::dispatcher::ActionDispatcher;
pub use self::layout::LayoutAction;
pub use self::r#trait::{create_dispatcher, Action};
