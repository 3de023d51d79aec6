#![allow(dead_code)]

#[derive(calmform::form::FormModel)]
struct Pair(String, u32);

fn main() {}
