extern crate smallvec;
extern crate regex;
extern crate failure;
#[macro_use] extern crate failure_derive;
#[macro_use] extern crate log;

pub mod input;
pub mod output;
pub mod eventsim;
pub mod railway;
pub mod world;


/// Clock ticks of the kernel clock server (10 ms each).
pub type Tick = i32;
/// Task id handed out by the kernel.
pub type Tid = usize;

use std::path::Path;
pub type AppResult<T> = Result<T, failure::Error>;

pub fn read_file(f :&Path) -> AppResult<String> {
  use std::fs::File;
  use std::io::prelude::*;
  use std::io::BufReader;

  let file = File::open(f)?;
  let mut file = BufReader::new(&file);
  let mut contents = String::new();
  file.read_to_string(&mut contents)?;
  Ok(contents)
}

use input::script;
pub fn get_script(s :&Path) -> AppResult<script::Script> {
    let contents = read_file(s)?;
    let d = script::parse_script(&contents)?;
    Ok(d)
}
