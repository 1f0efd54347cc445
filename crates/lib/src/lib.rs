//! iTach core library: IR command codec, device registry, gateway session and client,
//! shared by the CLI and any host integration.

pub mod command;
pub mod config;
pub mod device;
pub mod gateway;
pub mod init;
pub mod remote;
