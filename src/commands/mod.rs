pub mod detach;
pub mod extract;
pub mod info;
pub mod reattach;
mod utils;
