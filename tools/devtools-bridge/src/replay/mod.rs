//! Session recording and offline time travel.
//!
//! # Overview
//!
//! A [`recorder::RecordingChannel`] wraps any channel and appends every
//! message crossing it to a JSONL file (one `RecordEntry` per line):
//! 1. **session_start** – written once when the recorder is created
//! 2. **outbound** – each envelope delivered to the debugger, in delivery order
//! 3. **inbound** – each signal received from the debugger
//! 4. **evicted** – each envelope dropped from a bounded backlog before delivery
//!
//! A [`replayer::SessionRecording`] reads the file back, rebuilds the initial
//! model and the mutation log from the `init` and `execution` envelopes
//! (delivered or evicted, in production order), and runs the same replay
//! engine the live bridge uses.

pub mod recording;
pub mod recorder;
pub mod replayer;
