//! Booking store queries

pub mod bookings;
