#![allow(dead_code)]

#[derive(calmform::form::FormModel)]
enum Choice {
    Yes,
    No,
}

fn main() {}
