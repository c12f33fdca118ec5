//! CLI subcommand implementations

mod compile_cmd;
mod graph_cmd;
mod search_cmd;

pub use compile_cmd::cmd_compile;
pub use graph_cmd::cmd_graph;
pub use search_cmd::{cmd_search, SearchArgs};
