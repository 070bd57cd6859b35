/// Maps interleaved audio from `from` channels to `to` channels.
///
/// Mono is duplicated into every output channel. Any wider layout folded to
/// mono is averaged. Otherwise channels are copied by index, extra outputs
/// repeat the last source channel and extra inputs are dropped.
pub fn remix(input: &[f32], from: usize, to: usize) -> Vec<f32> {
    if from == to || from == 0 || to == 0 {
        return input.to_vec();
    }

    let frames = input.len() / from;
    let mut out = Vec::with_capacity(frames * to);

    for frame in input.chunks_exact(from) {
        if from == 1 {
            out.extend(std::iter::repeat(frame[0]).take(to));
        } else if to == 1 {
            out.push(frame.iter().sum::<f32>() / from as f32);
        } else {
            for ch in 0..to {
                out.push(frame[ch.min(from - 1)]);
            }
        }
    }
    out
}
