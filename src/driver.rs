//! Hardware drivers implementing the [`crate::swd::Swd`] seam.

pub mod bitbang;
