pub mod completion_sweep;
