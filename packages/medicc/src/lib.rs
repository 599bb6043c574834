pub mod ancestral;
pub mod distance;
pub mod encode;
pub mod events;
pub mod io;
pub mod model;
pub mod pipeline;
pub mod tree;
pub mod utils;
pub mod wgd;

#[cfg(test)]
mod tests {
  use crate::utils::global_init::global_init;
  use ctor::ctor;

  #[ctor]
  fn init() {
    global_init();
  }
}
