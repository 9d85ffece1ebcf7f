pub mod adapter;
pub mod error;
pub mod evm;
pub mod filecoin;
pub mod lighthouse;
pub mod registry;
pub mod storj;
