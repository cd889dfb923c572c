// Application layer: one pipeline per job of the command-line tool.

pub mod pipelines;
