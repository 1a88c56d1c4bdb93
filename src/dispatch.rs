//! Maps decoded sequencer events to tone writes.

use std::io;

use log::{info, warn};

use crate::seq::SeqEvent;

/// Equal-tempered frequency for a MIDI note number, A4 (69) = 440 Hz.
pub fn note_to_freq(note: u8) -> f64 {
	440.0 * f64::powf(2.0, (note as f64 - 69.0) / 12.0)
}

/// Where tones go. The real implementation is `tone::ToneDevice`; tests
/// substitute recording or failing fakes.
pub trait ToneSink {
	fn emit(&mut self, hz: i32) -> io::Result<()>;
}

/// One tone, last note wins. A note-off silences whatever is sounding,
/// regardless of which note it names; an unsubscribe acts as all-notes-off.
/// With no sink (the device failed to open) events are still logged and
/// every attempted write is reported.
pub struct Dispatcher<T: ToneSink> {
	sink: Option<T>,
}

impl<T: ToneSink> Dispatcher<T> {
	pub fn new(sink: Option<T>) -> Dispatcher<T> {
		Dispatcher { sink }
	}

	pub fn handle(&mut self, event: SeqEvent) {
		match event {
			SeqEvent::NoteOn { note } => {
				info!("note on {}", note);
				// the device takes whole Hz; truncate like the kernel would
				self.emit(note_to_freq(note) as i32);
			}
			SeqEvent::NoteOff => {
				info!("note off");
				self.emit(0);
			}
			SeqEvent::Subscribed => {
				info!("port subscribed");
			}
			SeqEvent::Unsubscribed => {
				info!("port unsubscribed");
				self.emit(0);
			}
			SeqEvent::Other => {}
		}
	}

	/// The final write of the shutdown sequence, so no tone is left
	/// sounding after exit.
	pub fn silence(&mut self) {
		self.emit(0);
	}

	fn emit(&mut self, hz: i32) {
		match self.sink.as_mut() {
			Some(sink) => {
				if let Err(e) = sink.emit(hz) {
					warn!("error writing tone: {}", e);
				}
			}
			None => warn!("no tone device, dropping {} Hz", hz),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[derive(Default)]
	struct RecordingSink {
		written: Vec<i32>,
	}

	impl ToneSink for RecordingSink {
		fn emit(&mut self, hz: i32) -> io::Result<()> {
			self.written.push(hz);
			Ok(())
		}
	}

	#[derive(Default)]
	struct FailingSink {
		attempts: usize,
	}

	impl ToneSink for FailingSink {
		fn emit(&mut self, _hz: i32) -> io::Result<()> {
			self.attempts += 1;
			Err(io::Error::new(io::ErrorKind::Other, "write error"))
		}
	}

	fn run_events(events: &[SeqEvent]) -> Vec<i32> {
		let mut dispatcher = Dispatcher::new(Some(RecordingSink::default()));
		for &ev in events {
			dispatcher.handle(ev);
		}
		dispatcher.silence();
		dispatcher.sink.unwrap().written
	}

	const EPS: f64 = 0.01;

	#[test]
	fn known_note_frequencies() {
		let cases = [
			(57u8, 220.0),
			(69u8, 440.0),
			(81u8, 880.0),
			(60u8, 261.6256),
			(127u8, 12543.85),
		];
		for &(note, expected) in &cases {
			let freq = note_to_freq(note);
			assert!(
				(freq - expected).abs() < EPS,
				"note_to_freq({}) = {}, expected ~{}",
				note,
				freq,
				expected
			);
		}
	}

	#[test]
	fn a4_is_exactly_440() {
		assert_eq!(note_to_freq(69), 440.0);
	}

	#[test]
	fn frequency_is_monotonic_over_the_note_range() {
		for note in 0u8..127 {
			assert!(note_to_freq(note) < note_to_freq(note + 1));
		}
	}

	#[test]
	fn note_frequency_is_truncated_to_whole_hz() {
		// 261.6256 Hz middle C goes out as 261, not 262
		let written = run_events(&[SeqEvent::NoteOn { note: 60 }]);
		assert_eq!(written[0], 261);
	}

	#[test]
	fn note_off_always_silences() {
		let written = run_events(&[SeqEvent::NoteOn { note: 81 }, SeqEvent::NoteOff]);
		assert_eq!(&written[..2], &[880, 0]);
	}

	#[test]
	fn note_off_without_preceding_note_on_still_silences() {
		let written = run_events(&[SeqEvent::NoteOff]);
		assert_eq!(written[0], 0);
	}

	#[test]
	fn unsubscribe_silences_exactly_once() {
		let written = run_events(&[SeqEvent::NoteOn { note: 69 }, SeqEvent::Unsubscribed]);
		assert_eq!(written, vec![440, 0, 0]); // trailing 0 is the final silence
	}

	#[test]
	fn subscribe_and_unknown_events_write_nothing() {
		let written = run_events(&[SeqEvent::Subscribed, SeqEvent::Other]);
		assert_eq!(written, vec![0]); // only the final silence
	}

	#[test]
	fn end_to_end_emit_sequence() {
		// [on 69, off, on 60, unsubscribe] then shutdown
		let written = run_events(&[
			SeqEvent::NoteOn { note: 69 },
			SeqEvent::NoteOff,
			SeqEvent::NoteOn { note: 60 },
			SeqEvent::Unsubscribed,
		]);
		assert_eq!(written, vec![440, 0, 261, 0, 0]);
	}

	#[test]
	fn write_failures_do_not_stop_dispatch() {
		let mut dispatcher = Dispatcher::new(Some(FailingSink::default()));
		dispatcher.handle(SeqEvent::NoteOn { note: 69 });
		dispatcher.handle(SeqEvent::NoteOff);
		dispatcher.handle(SeqEvent::NoteOn { note: 60 });
		dispatcher.silence();
		// one attempt per tone action, none of them fatal
		assert_eq!(dispatcher.sink.unwrap().attempts, 4);
	}

	#[test]
	fn missing_device_still_dispatches() {
		let mut dispatcher = Dispatcher::<RecordingSink>::new(None);
		dispatcher.handle(SeqEvent::NoteOn { note: 69 });
		dispatcher.handle(SeqEvent::NoteOff);
		dispatcher.silence();
		assert!(dispatcher.sink.is_none());
	}
}
