//! Session host: control loop, signal handling, instance pidfile, and the
//! visibility sink the loop drives.

pub mod loop_main;
pub mod pidfile;
pub mod signals;
pub mod sink;
