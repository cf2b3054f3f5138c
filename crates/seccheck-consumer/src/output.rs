//! Text rendering of received events.

use seccheck_wire::Event;
use seccheck_wire::messages::{Open, Read, Start, Syscall};

use crate::dispatcher::Dispatcher;

/// Renders one event as a single line.
///
/// Syscall events print as `E Open …` at entry and `X Open …` at exit;
/// everything else prints as `full.name => …`.
#[must_use]
pub fn format_event(event: &Event) -> String {
    let body = match event {
        Event::Open(m) => format!("{m:?}"),
        Event::Read(m) => format!("{m:?}"),
        Event::Syscall(m) => format!("{m:?}"),
        Event::ContainerStart(m) => format!("{m:?}"),
        Event::Unknown { value, .. } => format!("{} bytes", value.len()),
    };
    let name = event.type_name();
    match name.strip_prefix("gvisor.syscall.") {
        Some(short) => {
            let phase = if event.exit().is_some() { 'X' } else { 'E' };
            format!("{phase} {short} {body}")
        }
        None => format!("{name} => {body}"),
    }
}

#[allow(clippy::print_stdout)]
fn print(event: &Event) {
    println!("{}", format_event(event));
}

/// A dispatcher that prints every event type this build can decode.
#[must_use]
pub fn default_dispatcher() -> Dispatcher {
    use prost::Name;

    [
        Open::full_name(),
        Read::full_name(),
        Syscall::full_name(),
        Start::full_name(),
    ]
    .into_iter()
    .fold(Dispatcher::new(), |dispatcher, name| dispatcher.on(name, print))
}
