mod common;
mod poller;
