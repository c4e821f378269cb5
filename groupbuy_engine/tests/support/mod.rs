#![allow(dead_code)]
pub mod engine;
pub mod prepare_env;
pub mod recording_hooks;
