//! Application layer: the wizard facade, navigation, and middleware

pub mod middleware;
pub mod navigation;
pub mod wizard;
