//! Basic usage of vellum: an arena, a struct layout and path-derived handles

use vellum::{
    layout::value::{F64, I32},
    Arena, MemoryLayout, PathElement, Result, SegmentAllocatorExt,
};

fn main() -> Result<()> {
    env_logger::init();

    println!("vellum basic usage");
    println!("==================");

    // struct sample { i32 id; f64 readings[4]; }
    let sample = MemoryLayout::c_struct([
        I32.with_name("id").to_layout(),
        MemoryLayout::sequence_layout(4, F64)?.with_name("readings"),
    ])?
    .with_name("sample");
    println!("Layout: {}", sample);
    println!("  Size: {} bytes", sample.byte_size()?);
    println!("  Alignment: {} bytes", sample.byte_alignment());

    let id = sample.value_handle::<i32>(&[PathElement::group_element("id")])?;
    let readings = (0..4)
        .map(|j| {
            sample.value_handle::<f64>(&[
                PathElement::group_element("readings"),
                PathElement::sequence_element(j),
            ])
        })
        .collect::<Result<Vec<_>>>()?;
    println!("  id at offset {}", id.byte_offset());
    println!("  readings start at offset {}", readings[0].byte_offset());

    let arena = Arena::of_confined();
    let samples = arena.allocate_array(&sample, 3)?;
    println!("\nAllocated {} bytes in a {} arena", samples.byte_size(), arena.kind());

    let stride = sample.byte_size()?;
    for i in 0..3 {
        let base = i * stride;
        id.set(&samples, base, 100 + i as i32)?;
        for (j, reading) in readings.iter().enumerate() {
            reading.set(&samples, base, (i * 10 + j) as f64 * 0.5)?;
        }
    }

    for i in 0..3 {
        let base = i * stride;
        let values = readings
            .iter()
            .map(|reading| reading.get(&samples, base))
            .collect::<Result<Vec<_>>>()?;
        println!("  sample {}: id={} readings={:?}", i, id.get(&samples, base)?, values);
    }

    println!("\nSession stats: {}", arena.session().stats().summary());

    arena.close()?;
    if let Err(err) = id.get(&samples, 0) {
        println!("Arena closed; reading now fails with: {}", err);
    }

    Ok(())
}
