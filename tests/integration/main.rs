//! Integration tests: full pipeline from engine dispatch to stake.

mod mock_engine;
mod pipeline;
