//! Human-readable statistics on stdout.

use bytesize::ByteSize;
use storesim_core::RuntimeMetricsSnapshot;
use yansi::Paint;

/// Prints a statistics block for `snapshot` to stdout.
pub fn print(snapshot: &RuntimeMetricsSnapshot) {
    println!("{}\n", render(snapshot));
}

/// Formats a statistics block without trailing newline.
pub fn render(snapshot: &RuntimeMetricsSnapshot) -> String {
    format!(
        "{heading}\n\
         Keys:           {keys}\n\
         Ops/sec:        {ops}\n\
         P99 latency:    {p99:.3} ms\n\
         Bloom Index:    {bloom_index}\n\
         Bloom Hit %:    {bloom_hit:.2}%\n\
         Registry Hit %: {registry_hit:.2}%\n\
         Registry Fill:  {registry_fill:.2}%",
        heading = "[storesim]".bold(),
        keys = group_thousands(snapshot.key_count),
        ops = group_thousands(snapshot.ops_per_second),
        p99 = snapshot.p99_latency_ms,
        bloom_index = ByteSize::b(snapshot.bloom_index_size_bytes),
        bloom_hit = snapshot.bloom_hit_ratio,
        registry_hit = snapshot.registry_cache_hit_ratio,
        registry_fill = snapshot.registry_cache_fill,
    )
}

/// Formats `n` with a comma between groups of three digits.
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    grouped
}
