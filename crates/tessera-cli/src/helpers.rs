// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::io::{self, Write};

// ANSI color codes
pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const GREEN: &str = "\x1b[32m";
pub const RED: &str = "\x1b[31m";
pub const BLUE: &str = "\x1b[34m";
pub const YELLOW: &str = "\x1b[33m";
pub const CYAN: &str = "\x1b[36m";

// Visual symbols
pub const CHECK: &str = "✓";
pub const CROSS: &str = "✗";
pub const GEAR: &str = "⚙";

pub const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Chooses between coloured and plain rendering of console records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Palette {
    colour: bool,
}

impl Palette {
    pub const PLAIN: Palette = Palette { colour: false };
    pub const ANSI: Palette = Palette { colour: true };

    /// Colours only when `NO_COLOR` is unset.
    pub fn from_env() -> Self {
        if std::env::var_os("NO_COLOR").is_some() {
            Self::PLAIN
        } else {
            Self::ANSI
        }
    }

    pub fn paint<'a>(&self, code: &'a str) -> &'a str {
        if self.colour {
            code
        } else {
            ""
        }
    }
}

pub fn write_task_start(out: &mut impl Write, palette: Palette, task_name: &str, color: &str) -> io::Result<()> {
    writeln!(
        out,
        "\n{}{}{RULE} {} {RULE}{}",
        palette.paint(BOLD),
        palette.paint(color),
        task_name,
        palette.paint(RESET)
    )
}

pub fn write_success(out: &mut impl Write, palette: Palette, message: &str) -> io::Result<()> {
    writeln!(
        out,
        "{}{}{CHECK} {}{}",
        palette.paint(BOLD),
        palette.paint(GREEN),
        message,
        palette.paint(RESET)
    )
}

pub fn write_error(out: &mut impl Write, palette: Palette, message: &str) -> io::Result<()> {
    writeln!(
        out,
        "{}{}{CROSS} {}{}",
        palette.paint(BOLD),
        palette.paint(RED),
        message,
        palette.paint(RESET)
    )
}

pub fn print_error(message: &str) {
    let _ = write_error(&mut io::stderr().lock(), Palette::from_env(), message);
}

pub fn print_info(label: &str, message: &str) {
    let palette = Palette::from_env();
    println!("{}{GEAR} {label}:{} {message}", palette.paint(BOLD), palette.paint(RESET));
}
