pub mod app;
pub mod frame_clock;
pub mod host;
pub mod settings;
pub mod shell;
pub mod storage;
