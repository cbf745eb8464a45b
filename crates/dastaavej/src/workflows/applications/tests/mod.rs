mod access;
mod common;
mod routing;
