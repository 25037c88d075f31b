pub mod conversation;
pub mod sidebar;

pub use sidebar::Sidebar;
