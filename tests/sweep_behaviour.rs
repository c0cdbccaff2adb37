//! Behavioural scenarios for volume group sweeps.

mod sweep;
