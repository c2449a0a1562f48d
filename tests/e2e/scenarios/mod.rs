mod drift;
mod happy_path;
mod integrity;
mod merging;
mod sync;
