//! Configuration section definitions.
//!
//! Each module corresponds to a section in `liveedit.toml`:
//!
//! | Module     | TOML Section   | Purpose                                  |
//! |------------|----------------|------------------------------------------|
//! | `agent`    | `[agent]`      | WebSocket hub the on-device agents join  |
//! | `compiler` | `[compiler]`   | External compiler command                |
//! | `debounce` | `[debounce]`   | Quiet period before a pass               |
//! | `push`     | `[push]`       | Patch delivery knobs                     |

mod agent;
mod compiler;
mod debounce;
mod push;

pub use agent::AgentConfig;
pub use compiler::CompilerConfig;
pub use debounce::DebounceConfig;
pub use push::PushConfig;
