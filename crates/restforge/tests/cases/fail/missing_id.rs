// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

use restforge::Resource;

/// Resource without #[field(id)] should fail.
#[derive(Resource)]
pub struct Item {
    pub name: String,
    pub value: i32,
}

fn main() {}
