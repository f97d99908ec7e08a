mod commands;
mod handlers;

pub use commands::{Cli, Commands, ModerateAction, ModerateCommand};
pub use handlers::{
    handle_add, handle_comment, handle_import, handle_init, handle_like, handle_list,
    handle_moderate_delete, handle_moderate_list, handle_moderate_set, handle_read, handle_serve,
};
