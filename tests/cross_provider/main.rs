mod providers;
mod streaming_e2e;
