//! tricord - terminal simulator for the harmonizer pedal.
//!
//! Run with: cargo run
//!
//! The keyboard stands in for the pedal's controls:
//!
//!   a        footswitch 1 (hold to open the listening window)
//!   s        footswitch 2 (stop chord / tap tempo; with `a` = volume mode)
//!   [ / ]    volume pot
//!   Up/Down  key select (the menu collaborator)
//!   1-5      timbre   m  harmony mode   o  octave   p  arp mode
//!   r        routing  f  stop mode      i  instrument  u  transition muting
//!   q / Esc  quit
//!
//! With an input device present, the microphone feeds the FFT pitch
//! detector and the pedal harmonizes whatever you play at it.

mod app;
mod audio;
mod detector;
mod ui;

use color_eyre::eyre::Result as EyreResult;

fn main() -> EyreResult<()> {
    color_eyre::install()?;
    app::run()
}
