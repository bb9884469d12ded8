//! netsync agent
//!
//! Keeps a NetBox inventory in step with the network:
//!
//! - **VLAN sync**: reads the VLAN table of every tagged switch (IOS, NX-OS,
//!   VRP; SSH or Telnet) and converges the switch's VLAN group
//! - **VM sync**: collects the vCenter datacenter → cluster → host → VM tree
//!   into a snapshot file, then converges clusters and VMs to it
//! - **Provisioning**: finds a VLAN id free on several switches, pushes it
//!   to their trunks and records it

pub mod commands;
pub mod config;
pub mod error;
pub mod inventory;
pub mod observer;
pub mod output;
pub mod parse;
pub mod platform;
pub mod provision;
pub mod sync;
pub mod transport;
pub mod vm;
