pub mod audio;
pub mod canvas;
pub mod input;
