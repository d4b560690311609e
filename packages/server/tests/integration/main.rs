
mod http;
mod sweep;
mod upload;
