mod concurrency;
mod env;
mod fs;
mod host_imports;
mod lifecycle;
mod stdio;
