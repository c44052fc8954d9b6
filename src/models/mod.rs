mod link;

pub use link::{Link, LinkUpdate, NewLink};
