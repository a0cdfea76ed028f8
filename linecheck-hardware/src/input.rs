//! Linux input event devices (`/dev/input/eventN`)
//!
//! Each device is read on a dedicated thread that forwards decoded events
//! over a bounded channel, so async consumers can wait on events and the
//! halt latch together without cancelling a half-finished read.

use linecheck_core::{LineCheckError, Result};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Size of `struct input_event` on 64-bit Linux
pub const INPUT_EVENT_SIZE: usize = 24;

pub const EV_SYN: u16 = 0x00;
pub const EV_KEY: u16 = 0x01;
pub const EV_SW: u16 = 0x05;

pub const SW_HEADPHONE_INSERT: u16 = 0x02;

pub const KEY_HOME: u16 = 102;
pub const KEY_VOLUMEDOWN: u16 = 114;
pub const KEY_VOLUMEUP: u16 = 115;

/// Events buffered between the reader thread and its consumer
const EVENT_QUEUE_DEPTH: usize = 64;

/// Decoded input event (timestamp dropped)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub const fn new(kind: u16, code: u16, value: i32) -> Self {
        Self { kind, code, value }
    }

    /// Decode one raw `struct input_event`
    pub fn decode(raw: &[u8; INPUT_EVENT_SIZE]) -> Self {
        let kind = u16::from_ne_bytes([raw[16], raw[17]]);
        let code = u16::from_ne_bytes([raw[18], raw[19]]);
        let value = i32::from_ne_bytes([raw[20], raw[21], raw[22], raw[23]]);
        Self { kind, code, value }
    }

    pub fn is_sync(&self) -> bool {
        self.kind == EV_SYN
    }
}

/// Open an event device and stream its events.
///
/// The channel closes when the device goes away or returns an error.
pub fn open_input_device(path: &Path) -> Result<mpsc::Receiver<InputEvent>> {
    let file = File::open(path).map_err(|e| {
        LineCheckError::ResourceUnavailable(format!("{}: {}", path.display(), e))
    })?;
    Ok(spawn_reader(file, path.display().to_string()))
}

/// Stream decoded events from any byte source
pub fn spawn_reader<R>(mut source: R, name: String) -> mpsc::Receiver<InputEvent>
where
    R: Read + Send + 'static,
{
    let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
    std::thread::spawn(move || {
        let mut raw = [0u8; INPUT_EVENT_SIZE];
        loop {
            match source.read_exact(&mut raw) {
                Ok(()) => {
                    let event = InputEvent::decode(&raw);
                    if tx.blocking_send(event).is_err() {
                        debug!("{}: consumer gone, stopping reader", name);
                        return;
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("{}: end of stream", name);
                    return;
                }
                Err(e) => {
                    warn!("{}: read failed: {}", name, e);
                    return;
                }
            }
        }
    });
    rx
}

/// Encode an event the way the kernel lays it out
pub fn encode(event: InputEvent) -> [u8; INPUT_EVENT_SIZE] {
    let mut raw = [0u8; INPUT_EVENT_SIZE];
    raw[16..18].copy_from_slice(&event.kind.to_ne_bytes());
    raw[18..20].copy_from_slice(&event.code.to_ne_bytes());
    raw[20..24].copy_from_slice(&event.value.to_ne_bytes());
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_decode_key_event() {
        let mut raw = [0u8; INPUT_EVENT_SIZE];
        // timestamp bytes are ignored
        raw[..16].fill(0xAB);
        raw[16..18].copy_from_slice(&EV_KEY.to_ne_bytes());
        raw[18..20].copy_from_slice(&KEY_HOME.to_ne_bytes());
        raw[20..24].copy_from_slice(&1i32.to_ne_bytes());

        let event = InputEvent::decode(&raw);
        assert_eq!(event, InputEvent::new(EV_KEY, KEY_HOME, 1));
        assert!(!event.is_sync());
    }

    #[test]
    fn test_encode_matches_decode() {
        let event = InputEvent::new(EV_SW, SW_HEADPHONE_INSERT, 0);
        assert_eq!(InputEvent::decode(&encode(event)), event);
    }

    #[tokio::test]
    async fn test_reader_streams_until_eof() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&encode(InputEvent::new(EV_SW, SW_HEADPHONE_INSERT, 1)));
        bytes.extend_from_slice(&encode(InputEvent::new(EV_SYN, 0, 0)));
        bytes.extend_from_slice(&encode(InputEvent::new(EV_SW, SW_HEADPHONE_INSERT, 0)));
        // a trailing partial event is dropped
        bytes.extend_from_slice(&[0u8; 10]);

        let mut rx = spawn_reader(Cursor::new(bytes), "test".to_string());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].value, 1);
        assert!(events[1].is_sync());
        assert_eq!(events[2].value, 0);
    }

    #[test]
    fn test_open_missing_device() {
        let result = open_input_device(Path::new("/nonexistent/event9"));
        assert!(matches!(result, Err(LineCheckError::ResourceUnavailable(_))));
    }
}
