//! Services that drive models from async code.
//!
//! The engine call is blocking and single-shot. [`TidyRunner`] moves it onto
//! tokio's blocking pool and bounds it with a timeout, keeping the model's
//! single-writer discipline: the model is only touched before and after the
//! call, from the task that owns it.
//!
//! # Usage Example
//!
//! ```ignore
//! use tidy_bridge::services::TidyRunner;
//!
//! let runner = TidyRunner::new(Duration::from_secs(10));
//! model.set_source_text("<p>hello");
//! let events = runner.run(&mut model).await?;
//! ```

pub mod runner;

pub use runner::TidyRunner;
