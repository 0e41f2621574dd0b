mod directory;
mod token;

pub use directory::handle_directory_command;
pub use token::handle_token_command;
