//! Infrastructure layer of the host: sockets, child processes and the
//! configuration file.  Everything here implements a contract declared in
//! `application` or in `libria-core`.

pub mod ipc;
pub mod launcher;
pub mod storage;
