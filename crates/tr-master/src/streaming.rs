//! Producer/consumer bounded FIFO (§5 "Concurrency & Resource Model"):
//! the scheduler runs to completion on its own thread, pushing premix
//! frames into a bounded ring buffer, while the calling thread drains it
//! as an ordinary iterator.
//!
//! Grounded on the teacher's own `mb-audio` cpal backend, which splits a
//! `HeapRb` into a producer kept by the audio source and a consumer
//! handed to the output device. The real-time side there gets to drop
//! frames on overrun (`try_push` and move on); this sink may not, since
//! §5 calls the FIFO boundary back-pressured rather than lossy, so the
//! producer thread spins on `try_push` until the consumer catches up.

use std::thread::{self, JoinHandle};

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use tr_engine::{MixerSettings, PlayError, PremixFrame, Scheduler};
use tr_ir::Song;

/// Capacity of the bounded frame queue between the scheduler thread and
/// the consuming iterator.
const FIFO_CAPACITY: usize = 64;

/// Consumer side of a backgrounded render: an ordinary iterator that
/// blocks (via spin-yield) when the scheduler thread is still producing
/// and ends once the thread has finished and the queue has drained.
pub struct StreamingRender {
    consumer: HeapCons<PremixFrame>,
    handle: Option<JoinHandle<()>>,
}

impl StreamingRender {
    pub fn spawn(
        song: Song,
        sample_rate: u32,
        mixer_settings: MixerSettings,
        starting_order: usize,
        starting_row: usize,
    ) -> Result<Self, PlayError> {
        // Validate up front so a bad starting position or malformed song
        // surfaces to the caller before a thread is ever spawned.
        Scheduler::new(&song, sample_rate, mixer_settings, starting_order, starting_row)?;

        let rb = HeapRb::<PremixFrame>::new(FIFO_CAPACITY);
        let (producer, consumer) = rb.split();

        let handle = thread::spawn(move || {
            run_producer(song, sample_rate, mixer_settings, starting_order, starting_row, producer);
        });

        Ok(Self { consumer, handle: Some(handle) })
    }
}

fn run_producer(
    song: Song,
    sample_rate: u32,
    mixer_settings: MixerSettings,
    starting_order: usize,
    starting_row: usize,
    mut producer: HeapProd<PremixFrame>,
) {
    let scheduler = match Scheduler::new(&song, sample_rate, mixer_settings, starting_order, starting_row) {
        Ok(s) => s,
        Err(_) => return, // already validated in `spawn`; unreachable in practice.
    };

    for mut frame in scheduler {
        loop {
            match producer.try_push(frame) {
                Ok(()) => break,
                Err(rejected) => {
                    frame = rejected;
                    thread::yield_now();
                }
            }
        }
    }
}

impl Iterator for StreamingRender {
    type Item = PremixFrame;

    fn next(&mut self) -> Option<PremixFrame> {
        loop {
            if let Some(frame) = self.consumer.try_pop() {
                return Some(frame);
            }
            match &self.handle {
                Some(handle) if handle.is_finished() => {
                    // The producer thread only exits after its last push
                    // has succeeded, so one more drain attempt is safe.
                    if let Some(frame) = self.consumer.try_pop() {
                        return Some(frame);
                    }
                    if let Some(handle) = self.handle.take() {
                        let _ = handle.join();
                    }
                    return None;
                }
                Some(_) => thread::yield_now(),
                None => return None,
            }
        }
    }
}
