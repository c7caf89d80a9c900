//! Terminal user interface built on [ratatui](https://github.com/ratatui-org/ratatui).
//!
//! - **[`app`]**: session state, keyboard event loop, pane focus, expanded variables
//! - **[`panes`]**: stateless render functions for each visible pane (source,
//!   variables, console, status bar)
//! - **[`theme`]**: color palette shared by all panes
//!
//! Construct an [`App`] from a [`Session`](crate::session::Session) and call
//! [`App::run`](app::App::run) to start the event loop.

pub mod app;
pub mod panes;
pub mod theme;

pub use app::App;
