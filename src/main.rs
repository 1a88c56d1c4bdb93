//! Turn the PC speaker into an ALSA MIDI device.
//!
//! The program registers a writable port on the sequencer and plays
//! incoming notes as speaker tones. Wire something to it with standard
//! ALSA tooling:
//!
//! ```sh
//! $ sudo modprobe pcspkr
//! $ cargo run --release
//! $ aconnect -i              # find your keyboard
//! $ aconnect -o              # find pcspkr-midi
//! $ aconnect <input> <output>
//! ```
//!
//! Ctrl+C (or SIGTERM) stops the program; it always writes a final
//! silence before exiting so no tone keeps sounding.

mod dispatch;
mod seq;
mod tone;

use std::error::Error;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};

use alsa::poll::Flags;
use log::{error, info, warn};

use dispatch::Dispatcher;
use seq::SequencerClient;
use tone::{ToneDevice, ToneError};

const CLIENT_NAME: &str = "pcspkr-midi";
const SPEAKER_DEVICE: &str = "/dev/input/by-path/platform-pcspkr-event-spkr";
const POLL_TIMEOUT_MS: libc::c_int = 1000;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

// the flag is the only thing the handler may touch
extern "C" fn handle_signal(_signum: libc::c_int) {
	SHUTDOWN.store(true, Ordering::Relaxed);
}

fn shutdown_requested() -> bool {
	SHUTDOWN.load(Ordering::Relaxed)
}

fn install_signal_handlers() -> io::Result<()> {
	unsafe {
		let mut action: libc::sigaction = std::mem::zeroed();
		action.sa_sigaction = handle_signal as extern "C" fn(libc::c_int) as usize;
		libc::sigemptyset(&mut action.sa_mask);
		for signum in [libc::SIGINT, libc::SIGTERM] {
			if libc::sigaction(signum, &action, std::ptr::null_mut()) < 0 {
				return Err(io::Error::last_os_error());
			}
		}
	}
	Ok(())
}

fn run() -> Result<(), Box<dyn Error>> {
	let client = SequencerClient::open(CLIENT_NAME)?;
	info!(
		"opened ALSA MIDI client:port {}:{}",
		client.client_id(),
		client.port_id()
	);

	let device = match ToneDevice::open(SPEAKER_DEVICE) {
		Ok(device) => {
			let id = device.identity();
			info!(
				"found \"{}\": bustype = {}, vendor = 0x{:04x}, product = 0x{:04x}, version = {}",
				id.name, id.bustype, id.vendor, id.product, id.version
			);
			Some(device)
		}
		Err(ToneError::Open(e)) => {
			// keep running without audio so MIDI traffic stays visible
			warn!(
				"could not open {}: {}. did you \"modprobe pcspkr\"?",
				SPEAKER_DEVICE, e
			);
			None
		}
		Err(e) => return Err(e.into()),
	};
	let mut dispatcher = Dispatcher::new(device);

	install_signal_handlers()?;

	let mut fds = client.poll_descriptors()?;

	loop {
		let ready =
			unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, POLL_TIMEOUT_MS) };
		// the signal may have interrupted the poll itself
		if shutdown_requested() {
			break;
		}
		if ready == 0 {
			continue; // timeout
		}
		if ready < 0 {
			let err = io::Error::last_os_error();
			if err.raw_os_error() == Some(libc::EINTR) {
				continue;
			}
			return Err(format!("poll error: {}", err).into());
		}
		let revents = client.revents(&fds)?;
		if revents.intersects(Flags::ERR | Flags::NVAL) {
			break;
		}
		if !revents.contains(Flags::IN) {
			continue;
		}
		if let Some(event) = client.read_event()? {
			dispatcher.handle(event);
		}
	}

	dispatcher.silence();
	Ok(())
}

fn main() {
	env_logger::builder()
		.filter_level(log::LevelFilter::Info)
		.init();

	if let Err(e) = run() {
		error!("{}", e);
		std::process::exit(1);
	}
}
