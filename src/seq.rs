//! The virtual MIDI input port on the ALSA sequencer.
//! Other clients discover and subscribe to it with standard tooling
//! (`aconnect`, qjackctl's ALSA tab); we only ever read from it.

use std::error::Error;
use std::ffi::CString;

use alsa::poll::{Descriptors, Flags};
use alsa::seq::{EvNote, Event, EventType, PortCap, PortType, Seq};
use alsa::Direction;

/// The sequencer events this program acts on, decoded into plain data.
/// Everything else collapses into `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqEvent {
	NoteOn { note: u8 },
	NoteOff,
	Subscribed,
	Unsubscribed,
	Other,
}

pub struct SequencerClient {
	seq: Seq,
	client_id: i32,
	port_id: i32,
}

impl SequencerClient {
	/// Open a duplex, nonblocking connection to the default sequencer and
	/// create one writable, subscribable application port under `name`.
	pub fn open(name: &str) -> Result<SequencerClient, Box<dyn Error>> {
		let cname = CString::new(name)?;
		let seq = Seq::open(None, None, true)?;
		seq.set_client_name(&cname)?;
		let client_id = seq.client_id()?;
		let port_id = seq.create_simple_port(
			&cname,
			PortCap::WRITE | PortCap::SUBS_WRITE | PortCap::SYNC_WRITE,
			PortType::APPLICATION,
		)?;
		Ok(SequencerClient {
			seq,
			client_id,
			port_id,
		})
	}

	pub fn client_id(&self) -> i32 {
		self.client_id
	}

	pub fn port_id(&self) -> i32 {
		self.port_id
	}

	/// The pollfds to wait on for inbound events. The count is
	/// connection-specific, so this is queried after setup rather
	/// than assumed.
	pub fn poll_descriptors(&self) -> alsa::Result<Vec<libc::pollfd>> {
		(&self.seq, Some(Direction::Capture)).get()
	}

	/// Which of our descriptors actually fired after a poll wakeup.
	pub fn revents(&self, fds: &[libc::pollfd]) -> alsa::Result<Flags> {
		(&self.seq, Some(Direction::Capture)).revents(fds)
	}

	/// Pull at most one event off the connection. `Ok(None)` means nothing
	/// is queued right now; that is not an error on a nonblocking
	/// connection. The underlying event buffer is released before this
	/// returns, on every path.
	pub fn read_event(&self) -> alsa::Result<Option<SeqEvent>> {
		let mut input = self.seq.input();
		match input.event_input() {
			Ok(ev) => Ok(Some(decode(&ev))),
			Err(e) if e.errno() == libc::EAGAIN => Ok(None),
			Err(e) => Err(e),
		}
	}
}

fn decode(ev: &Event) -> SeqEvent {
	match ev.get_type() {
		EventType::Noteon => match ev.get_data::<EvNote>() {
			Some(note) => SeqEvent::NoteOn { note: note.note },
			None => SeqEvent::Other,
		},
		// which note was released doesn't matter; there is only one tone
		EventType::Noteoff => SeqEvent::NoteOff,
		EventType::PortSubscribed => SeqEvent::Subscribed,
		EventType::PortUnsubscribed => SeqEvent::Unsubscribed,
		_ => SeqEvent::Other,
	}
}
