//cargo run --example=dump -- path/to/object.o

use std::env;
use std::fs;
use std::path::Path;

use picolink::coff::object::Object;

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        println!("usage: dump <path to COFF object>");
        return;
    }
    let path = Path::new(&args[1]);
    let data = fs::read(path).unwrap();
    let object = Object::parse(&data, args[1].clone()).unwrap();
    println!("{}", object);
}
