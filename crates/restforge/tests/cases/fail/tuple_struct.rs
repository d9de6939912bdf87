// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

use restforge::Resource;

#[derive(Resource)]
pub struct Item(i64, String);

fn main() {}
