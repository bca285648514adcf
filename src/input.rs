use crate::app::InputMode;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Quit,
    NextTab,
    PrevTab,
    Down,
    Up,
    PageDown,
    PageUp,
    Top,
    Bottom,
    ToggleHelp,
    EnterResource,
    ShowSpec,
    ToggleLogStream,
    Back,
    Restart,
    Stop,
    StartFilter,
    Refresh,
    SubmitInput,
    CancelInput,
    Backspace,
    InputChar(char),
    ConfirmYes,
    ConfirmNo,
}

pub fn map_key(mode: InputMode, key: KeyEvent) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }
    match mode {
        InputMode::Normal => map_normal_mode_key(key),
        InputMode::Filter => map_input_mode_key(key),
    }
}

fn map_normal_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Char('q') => Some(Action::Quit),
        KeyCode::Char('j') if key.modifiers.is_empty() => Some(Action::Down),
        KeyCode::Down => Some(Action::Down),
        KeyCode::Char('k') if key.modifiers.is_empty() => Some(Action::Up),
        KeyCode::Up => Some(Action::Up),
        KeyCode::Left | KeyCode::BackTab => Some(Action::PrevTab),
        KeyCode::Right | KeyCode::Tab => Some(Action::NextTab),
        KeyCode::Char('g') if key.modifiers.is_empty() => Some(Action::Top),
        KeyCode::Home => Some(Action::Top),
        KeyCode::Char('G') | KeyCode::End => Some(Action::Bottom),
        KeyCode::PageDown => Some(Action::PageDown),
        KeyCode::PageUp => Some(Action::PageUp),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::PageDown)
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => Some(Action::PageUp),
        KeyCode::Char('?') => Some(Action::ToggleHelp),
        KeyCode::Char('r') if key.modifiers.is_empty() => Some(Action::Refresh),
        KeyCode::F(5) => Some(Action::Refresh),
        KeyCode::Char('/') => Some(Action::StartFilter),
        KeyCode::Char('s') if key.modifiers.is_empty() => Some(Action::ShowSpec),
        KeyCode::Char('e') if key.modifiers.is_empty() => Some(Action::ToggleLogStream),
        KeyCode::Char('R') => Some(Action::Restart),
        KeyCode::Char('X') => Some(Action::Stop),
        KeyCode::Char('y') | KeyCode::Char('Y') => Some(Action::ConfirmYes),
        KeyCode::Char('n') | KeyCode::Char('N') => Some(Action::ConfirmNo),
        KeyCode::Enter => Some(Action::EnterResource),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::EnterResource)
        }
        KeyCode::Esc => Some(Action::Back),
        _ => None,
    }
}

fn map_input_mode_key(key: KeyEvent) -> Option<Action> {
    match key.code {
        KeyCode::Esc => Some(Action::CancelInput),
        KeyCode::Enter => Some(Action::SubmitInput),
        KeyCode::Char('m') | KeyCode::Char('j')
            if key.modifiers.contains(KeyModifiers::CONTROL) =>
        {
            Some(Action::SubmitInput)
        }
        KeyCode::Backspace => Some(Action::Backspace),
        KeyCode::Char('h') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(Action::Backspace)
        }
        KeyCode::Char(c) if key.modifiers.is_empty() || key.modifiers == KeyModifiers::SHIFT => {
            Some(Action::InputChar(c))
        }
        _ => None,
    }
}

/// Turns raw terminal input bytes, as delivered over an SSH channel, into key
/// events. Escape sequences split across reads are held until complete; a
/// lone trailing ESC is reported as the Esc key.
#[derive(Debug, Default)]
pub struct KeyDecoder {
    pending: Vec<u8>,
}

enum Decoded {
    Key(Option<KeyEvent>, usize),
    Incomplete,
}

const MAX_PENDING: usize = 16;

impl KeyDecoder {
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<KeyEvent> {
        self.pending.extend_from_slice(bytes);

        let mut keys = Vec::new();
        let mut index = 0;
        while index < self.pending.len() {
            match decode_one(&self.pending[index..]) {
                Decoded::Key(key, used) => {
                    keys.extend(key);
                    index += used;
                }
                Decoded::Incomplete if self.pending.len() - index > MAX_PENDING => {
                    // garbage that never terminates; drop it
                    index = self.pending.len();
                }
                Decoded::Incomplete => break,
            }
        }
        self.pending.drain(..index);
        keys
    }
}

fn plain(code: KeyCode) -> Option<KeyEvent> {
    Some(KeyEvent::new(code, KeyModifiers::NONE))
}

fn decode_one(bytes: &[u8]) -> Decoded {
    match bytes[0] {
        0x1b => decode_escape(bytes),
        b'\r' | b'\n' => Decoded::Key(plain(KeyCode::Enter), 1),
        b'\t' => Decoded::Key(plain(KeyCode::Tab), 1),
        0x7f | 0x08 => Decoded::Key(plain(KeyCode::Backspace), 1),
        byte @ 0x01..=0x1a => {
            let letter = char::from(b'a' + byte - 1);
            Decoded::Key(
                Some(KeyEvent::new(KeyCode::Char(letter), KeyModifiers::CONTROL)),
                1,
            )
        }
        0x00..=0x1f => Decoded::Key(None, 1),
        first => {
            let width = utf8_width(first);
            if bytes.len() < width {
                return Decoded::Incomplete;
            }
            match std::str::from_utf8(&bytes[..width])
                .ok()
                .and_then(|text| text.chars().next())
            {
                Some(c) => Decoded::Key(plain(KeyCode::Char(c)), width),
                None => Decoded::Key(None, 1),
            }
        }
    }
}

fn utf8_width(first: u8) -> usize {
    match first {
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 1,
    }
}

fn decode_escape(bytes: &[u8]) -> Decoded {
    match bytes.get(1) {
        None => Decoded::Key(plain(KeyCode::Esc), 1),
        Some(b'[') => {
            let Some(end) = bytes[2..]
                .iter()
                .position(|byte| (0x40..=0x7e).contains(byte))
                .map(|offset| offset + 2)
            else {
                return Decoded::Incomplete;
            };
            let params = &bytes[2..end];
            let code = match (params, bytes[end]) {
                (b"", b'A') => Some(KeyCode::Up),
                (b"", b'B') => Some(KeyCode::Down),
                (b"", b'C') => Some(KeyCode::Right),
                (b"", b'D') => Some(KeyCode::Left),
                (b"", b'H') | (b"1", b'~') | (b"7", b'~') => Some(KeyCode::Home),
                (b"", b'F') | (b"4", b'~') | (b"8", b'~') => Some(KeyCode::End),
                (b"3", b'~') => Some(KeyCode::Delete),
                (b"5", b'~') => Some(KeyCode::PageUp),
                (b"6", b'~') => Some(KeyCode::PageDown),
                (b"", b'Z') => {
                    return Decoded::Key(
                        Some(KeyEvent::new(KeyCode::BackTab, KeyModifiers::SHIFT)),
                        end + 1,
                    );
                }
                _ => None,
            };
            Decoded::Key(code.and_then(plain), end + 1)
        }
        Some(b'O') => {
            let Some(last) = bytes.get(2) else {
                return Decoded::Incomplete;
            };
            let code = match last {
                b'A' => Some(KeyCode::Up),
                b'B' => Some(KeyCode::Down),
                b'C' => Some(KeyCode::Right),
                b'D' => Some(KeyCode::Left),
                b'H' => Some(KeyCode::Home),
                b'F' => Some(KeyCode::End),
                _ => None,
            };
            Decoded::Key(code.and_then(plain), 3)
        }
        Some(_) => Decoded::Key(plain(KeyCode::Esc), 1),
    }
}
