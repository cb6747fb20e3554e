//cargo run --example=link -- a.o b.o out.hex

use std::env;
use std::fs;

use picolink::coff::object::Object;
use picolink::hex::IntelHexImage;
use picolink::{link, Diagnostics, ProcessorTable};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        println!("usage: link <object>... <output.hex>");
        return;
    }
    let output = &args[args.len() - 1];
    let inputs = &args[1..args.len() - 1];

    let mut objects: Vec<Object> = inputs
        .iter()
        .map(|path| {
            let data = fs::read(path).unwrap();
            Object::parse(&data, path.clone()).unwrap()
        })
        .collect();

    let processors = ProcessorTable::builtin();
    let mut sink = IntelHexImage::new();
    let mut diagnostics = Diagnostics::new();

    link(&mut objects, &processors, &mut sink, &mut diagnostics).unwrap();
    for diagnostic in diagnostics.entries() {
        eprintln!("{}", diagnostic);
    }

    let mut out = fs::File::create(output).unwrap();
    sink.write_to(&mut out).unwrap();

    if diagnostics.has_errors() {
        std::process::exit(1);
    }
}
