#[macro_export]
macro_rules! assert_epsilon {
    ($x:expr, $y:expr) => {
        let x = $x; // Make sure we evaluate only once
        let y = $y;
        if !(x - y < 0.000005 && y - x < 0.000005) {
            println!("Expectation: {}, Got: {}", y, x);
            panic!();
        }
    };
}

/// Two disjoint mutable windows into the same weights slice.
/// Embedding blocks of an interacting pair never overlap, since they differ at least in field.
#[inline(always)]
pub fn get_input_output_borrows(
    i: &mut [f32],
    start1: usize,
    len1: usize,
    start2: usize,
    len2: usize,
) -> (&mut [f32], &mut [f32]) {
    debug_assert!(
        (start1 >= start2 + len2) || (start2 >= start1 + len1),
        "start1: {}, len1: {}, start2: {}, len2 {}",
        start1,
        len1,
        start2,
        len2
    );
    if start2 > start1 {
        let (rest, second) = i.split_at_mut(start2);
        let (_, first) = rest.split_at_mut(start1);
        (&mut first[0..len1], &mut second[0..len2])
    } else {
        let (rest, first) = i.split_at_mut(start1);
        let (_, second) = rest.split_at_mut(start2);
        (&mut first[0..len1], &mut second[0..len2])
    }
}
