//! quarry's outer shell: CLI flags, repository walking, the socket server and
//! the CLI/JSON presentation layer. The search core lives in the `quarry`
//! crate; everything here feeds it or presents its output.

pub mod config;
pub mod server;
pub mod session;
pub mod walker;

pub use config::{parse_tree_spec, Args, TreeSpec};
pub use server::{parse_listen_spec, serve, ListenSpec, ServerConfig};
pub use session::{
    parse_cli_query, CliPresenter, JsonPresenter, Presenter, QueryGate, Session, SessionRequest,
};
