//! Scene timing: maps word-level narration timestamps onto image scenes.

use reel_models::transcript::secs_to_ms;
use reel_models::{TimedScene, WordTimestamp};

/// Shortest segment handed to the renderer; zero-length scenes would drop
/// out of a concat.
pub const MIN_SEGMENT_SECS: f64 = 0.1;

/// Align `words` onto one scene per prompt.
///
/// Scene boundaries snap to word ends. Each scene greedily takes words
/// while the next word starts before `scene_start + total / prompts`. The
/// last scene takes whatever is left and ends at the audio duration. When
/// the words run out before the prompts do, the remaining time is split
/// evenly across the remaining prompts.
///
/// Returns an empty vec when either input is empty.
pub fn align(words: &[WordTimestamp], prompts: &[String], audio_duration_secs: f64) -> Vec<TimedScene> {
    if words.is_empty() || prompts.is_empty() {
        return Vec::new();
    }

    let first_start = words[0].start_ms;
    let total_ms = secs_to_ms(audio_duration_secs).max(first_start);
    let scene_count = prompts.len();
    let target_ms = total_ms as f64 / scene_count as f64;

    let mut scenes = Vec::with_capacity(scene_count);
    let mut cursor = 0usize;
    let mut scene_start = first_start;

    for (i, prompt) in prompts.iter().enumerate() {
        if cursor >= words.len() {
            break;
        }

        if i == scene_count - 1 {
            scenes.push(TimedScene::new(scene_start, total_ms, prompt.clone()));
            cursor = words.len();
            break;
        }

        let boundary = scene_start as f64 + target_ms;

        let mut last = cursor;
        while last + 1 < words.len() && (words[last + 1].start_ms as f64) < boundary {
            last += 1;
        }

        let end = words[last].end_ms.max(scene_start).min(total_ms);
        scenes.push(TimedScene::new(scene_start, end, prompt.clone()));
        scene_start = end;
        cursor = last + 1;
    }

    if scenes.len() < scene_count {
        let remaining = scene_count - scenes.len();
        let step = total_ms.saturating_sub(scene_start) / remaining as u64;
        for (k, prompt) in prompts[scenes.len()..].to_vec().into_iter().enumerate() {
            let start = scene_start + step * k as u64;
            let end = if k == remaining - 1 { total_ms } else { start + step };
            scenes.push(TimedScene::new(start, end, prompt));
        }
    }

    scenes
}

/// Attach image URLs by position. Scenes past the end of `urls` reuse
/// `urls[index % urls.len()]`.
pub fn attach_image_urls(scenes: &mut [TimedScene], urls: &[String]) {
    if urls.is_empty() {
        return;
    }
    for (i, scene) in scenes.iter_mut().enumerate() {
        scene.image_urls = vec![urls[i % urls.len()].clone()];
    }
}

/// Per-scene display durations in seconds for the renderer.
///
/// The first scene also covers any silence before the first word so the
/// segments add up to the audio length. Segments are at least
/// [`MIN_SEGMENT_SECS`] long; the mux is cut at the audio end anyway.
pub fn display_durations(scenes: &[TimedScene], audio_duration_secs: f64) -> Vec<f64> {
    let mut durations: Vec<f64> = scenes
        .iter()
        .enumerate()
        .map(|(i, scene)| {
            let ms = if i == 0 { scene.end_ms } else { scene.duration_ms() };
            (ms as f64 / 1000.0).max(MIN_SEGMENT_SECS)
        })
        .collect();

    let sum: f64 = durations.iter().sum();
    if let Some(last) = durations.last_mut() {
        if sum < audio_duration_secs {
            *last += audio_duration_secs - sum;
        }
    }
    durations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("prompt {}", i)).collect()
    }

    fn spans(scenes: &[TimedScene]) -> Vec<(u64, u64)> {
        scenes.iter().map(|s| (s.start_ms, s.end_ms)).collect()
    }

    /// Words of varying length separated by small gaps.
    fn synthetic_words(count: usize, seed: u64) -> Vec<WordTimestamp> {
        let mut state = seed;
        let mut t = 120;
        (0..count)
            .map(|i| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let len = 80 + (state >> 33) % 600;
                let gap = (state >> 20) % 90;
                let word = WordTimestamp::new(format!("w{}", i), t, t + len);
                t += len + gap;
                word
            })
            .collect()
    }

    #[test]
    fn test_two_word_scenario() {
        let words = vec![WordTimestamp::new("hi", 0, 400), WordTimestamp::new("there", 1100, 1700)];
        let scenes = align(&words, &["a".to_string(), "b".to_string()], 2.0);
        assert_eq!(spans(&scenes), vec![(0, 400), (400, 2000)]);
        assert_eq!(scenes[0].image_prompts, vec!["a".to_string()]);
        assert_eq!(scenes[1].image_prompts, vec!["b".to_string()]);
    }

    #[test]
    fn test_single_prompt_covers_everything() {
        let words = synthetic_words(12, 7);
        let scenes = align(&words, &prompts(1), 9.0);
        assert_eq!(spans(&scenes), vec![(words[0].start_ms, 9000)]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(align(&[], &prompts(3), 4.0).is_empty());
        assert!(align(&synthetic_words(3, 1), &[], 4.0).is_empty());
    }

    #[test]
    fn test_more_prompts_than_words_uses_even_tail() {
        let words = vec![WordTimestamp::new("one", 0, 400), WordTimestamp::new("two", 400, 1000)];
        let scenes = align(&words, &prompts(5), 4.0);
        assert_eq!(scenes.len(), 5);
        // "two" starts before the 800ms boundary, so the first scene takes both
        assert_eq!(scenes[0].end_ms, 1000);
        assert_eq!(
            spans(&scenes[1..]),
            vec![(1000, 1750), (1750, 2500), (2500, 3250), (3250, 4000)]
        );
    }

    #[test]
    fn test_single_word_spanning_clip() {
        let words = vec![WordTimestamp::new("mmm", 0, 3000)];
        let scenes = align(&words, &prompts(3), 3.0);
        assert_eq!(scenes.len(), 3);
        assert_eq!(scenes[0].end_ms, 3000);
        assert!(scenes.iter().all(|s| s.end_ms == 3000));
    }

    #[test]
    fn test_greedy_window_prefers_extra_word() {
        // target is 1000ms; "c" starts at 900 so it joins the first scene
        let words = vec![
            WordTimestamp::new("a", 0, 300),
            WordTimestamp::new("b", 300, 900),
            WordTimestamp::new("c", 900, 1300),
            WordTimestamp::new("d", 1300, 1800),
            WordTimestamp::new("e", 1800, 2000),
        ];
        let scenes = align(&words, &prompts(2), 2.0);
        assert_eq!(spans(&scenes), vec![(0, 1300), (1300, 2000)]);
    }

    #[test]
    fn test_dense_words_fill_first_window() {
        // every word starts before the 2000ms boundary
        let words = vec![
            WordTimestamp::new("a", 0, 100),
            WordTimestamp::new("b", 100, 200),
            WordTimestamp::new("c", 200, 300),
            WordTimestamp::new("d", 300, 400),
        ];
        let scenes = align(&words, &prompts(2), 4.0);
        assert_eq!(spans(&scenes), vec![(0, 400), (400, 4000)]);

        let scenes = align(&words, &prompts(3), 4.0);
        assert_eq!(spans(&scenes), vec![(0, 400), (400, 2200), (2200, 4000)]);
    }

    #[test]
    fn test_alignment_properties_hold() {
        for seed in 1..40u64 {
            let word_count = 1 + (seed as usize * 7) % 30;
            let prompt_count = 1 + (seed as usize * 3) % 9;
            let words = synthetic_words(word_count, seed);
            let last_end = words.last().unwrap().end_ms;
            let audio_secs = (last_end + (seed % 5) * 100) as f64 / 1000.0;
            let total_ms = secs_to_ms(audio_secs);

            let scenes = align(&words, &prompts(prompt_count), audio_secs);

            assert_eq!(scenes.len(), prompt_count, "seed {}", seed);
            assert_eq!(scenes[0].start_ms, words[0].start_ms);
            assert_eq!(scenes.last().unwrap().end_ms, total_ms);
            for pair in scenes.windows(2) {
                assert_eq!(pair[0].end_ms, pair[1].start_ms, "gap at seed {}", seed);
                assert!(pair[0].start_ms <= pair[0].end_ms);
            }
            let sum: u64 = scenes.iter().map(|s| s.duration_ms()).sum();
            assert_eq!(sum, total_ms - words[0].start_ms);

            // Only the evenly split tail may end between words.
            for scene in &scenes[..scenes.len() - 1] {
                assert!(
                    words.iter().any(|w| w.end_ms == scene.end_ms) || scene.end_ms >= last_end,
                    "scene end {} is not a word end (seed {})",
                    scene.end_ms,
                    seed
                );
            }
        }
    }

    #[test]
    fn test_attach_image_urls_wraps() {
        let words = synthetic_words(6, 3);
        let mut scenes = align(&words, &prompts(3), 5.0);
        attach_image_urls(&mut scenes, &["u0".to_string(), "u1".to_string()]);
        let urls: Vec<&str> = scenes.iter().map(|s| s.image_urls[0].as_str()).collect();
        assert_eq!(urls, vec!["u0", "u1", "u0"]);
    }

    #[test]
    fn test_display_durations_cover_audio() {
        let scenes = vec![TimedScene::new(250, 1000, "a"), TimedScene::new(1000, 1000, "b"), TimedScene::new(1000, 2500, "c")];
        let durations = display_durations(&scenes, 2.5);
        assert_eq!(durations[0], 1.0);
        assert_eq!(durations[1], MIN_SEGMENT_SECS);
        assert!((durations[2] - 1.5).abs() < 1e-9);
    }
}
