/// Largest font size whose measured ink box fits `box_w` x `box_h`.
///
/// `measure` returns `(width, height)` at a size and must grow with it.
/// Sizes are searched in `[1, box_h + 10]`; the result is never below 1,
/// even when size 1 already overflows.
pub fn fit_font_size<F>(box_w: u32, box_h: u32, measure: F) -> u32
where
    F: Fn(u32) -> (f32, f32),
{
    let fits = |size: u32| {
        let (w, h) = measure(size);
        w <= box_w as f32 && h <= box_h as f32
    };

    let mut lo = 1;
    let mut hi = box_h + 10;
    if !fits(lo) {
        return 1;
    }

    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}
