pub mod confirmation_sweep;
pub mod plan_sync;
