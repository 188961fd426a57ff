pub mod local_store;

pub use local_store::LocalStore;
