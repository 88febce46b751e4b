//! Library crate for matchday-back: the event server, its storage backends and the client-side
//! live engine used by viewers and control rooms.

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod live;
pub mod routes;
pub mod services;
pub mod state;
