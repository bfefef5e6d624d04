mod common;

mod bulk;
mod messaging;
mod orchestrator;
