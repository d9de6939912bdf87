// SPDX-FileCopyrightText: 2025-2026 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

use restforge::Resource;

#[derive(Resource)]
pub struct Post {
    #[field(id)]
    pub id: i64,
    #[belongs_to(User)]
    pub author: i64,
}

fn main() {}
