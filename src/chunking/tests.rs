use super::*;

fn config(target_size: usize, overlap: usize) -> ChunkingConfig {
    ChunkingConfig {
        target_size,
        overlap,
        strategy: ChunkingStrategy::Paragraph,
    }
}

/// Eight repetitions of a four-letter word, 39 characters
fn paragraph_of(letter: char) -> String {
    let word: String = std::iter::repeat_n(letter, 4).collect();
    vec![word; 8].join(" ")
}

fn shared_edge(previous: &str, next: &str) -> usize {
    let previous: Vec<char> = previous.chars().collect();
    let next: Vec<char> = next.chars().collect();
    let max = previous.len().min(next.len());

    (1..=max)
        .rev()
        .find(|&k| previous[previous.len() - k..] == next[..k])
        .unwrap_or(0)
}

#[test]
fn empty_input_produces_no_chunks() {
    let config = ChunkingConfig::default();

    assert!(chunk_text("", None, &config).expect("chunking should succeed").is_empty());
    assert!(
        chunk_text("   \n\n \t ", Some("blank"), &config)
            .expect("chunking should succeed")
            .is_empty()
    );
}

#[test]
fn overlap_not_smaller_than_target_is_rejected() {
    let result = chunk_text("some text", None, &config(100, 100));
    assert!(matches!(result, Err(RagError::Chunking(_))));

    let result = chunk_text("some text", None, &config(0, 0));
    assert!(matches!(result, Err(RagError::Chunking(_))));
}

#[test]
fn short_text_is_single_chunk() {
    let chunks = chunk_text(
        "  Paris is the capital of France.  ",
        Some("geo.txt"),
        &ChunkingConfig::default(),
    )
    .expect("chunking should succeed");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, "Paris is the capital of France.");
    assert_eq!(chunks[0].source_title.as_deref(), Some("geo.txt"));
    assert_eq!(chunks[0].index, 0);
}

#[test]
fn paragraphs_are_grouped_until_target() {
    let (a, b, c) = (paragraph_of('a'), paragraph_of('b'), paragraph_of('c'));
    let text = format!("{a}\n\n{b}\n\n\n{c}\n");

    let chunks = chunk_text(&text, None, &config(100, 0)).expect("chunking should succeed");

    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0].text, format!("{a}\n\n{b}"));
    assert_eq!(chunks[1].text, c);
}

#[test]
fn next_chunk_is_seeded_with_overlap() {
    let (a, b, c) = (paragraph_of('a'), paragraph_of('b'), paragraph_of('c'));
    let text = format!("{a}\n\n{b}\n\n{c}");

    let chunks = chunk_text(&text, None, &config(100, 10)).expect("chunking should succeed");

    assert_eq!(chunks.len(), 2);
    let seed = chunks[1]
        .text
        .strip_suffix(c.as_str())
        .expect("second chunk should end with the third paragraph")
        .trim();
    assert!(!seed.is_empty());
    assert!(char_len(seed) <= 10);
    assert!(chunks[0].text.ends_with(seed));
}

#[test]
fn long_paragraph_falls_back_to_sentences() {
    let text = (0..20)
        .map(|i| format!("Sentence number {i} is here."))
        .collect::<Vec<_>>()
        .join(" ");

    let chunks = chunk_text(&text, None, &config(100, 0)).expect("chunking should succeed");

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(char_len(&chunk.text) <= 100, "chunk too long: {}", chunk.text);
        assert!(chunk.text.ends_with('.'), "chunk split mid-sentence: {}", chunk.text);
    }
}

#[test]
fn every_word_is_covered() {
    let intro = "A short opening paragraph.";
    let body = (0..30)
        .map(|i| format!("Word w{i} sits in sentence s{i}!"))
        .collect::<Vec<_>>()
        .join(" ");
    let text = format!("{intro}\n\n{body}\n\nA closing remark?");

    let chunks = chunk_text(&text, Some("doc"), &config(80, 20)).expect("chunking should succeed");

    for word in text.split_whitespace() {
        assert!(
            chunks
                .iter()
                .any(|chunk| chunk.text.split_whitespace().any(|token| token == word)),
            "word {word:?} missing from chunks"
        );
    }
}

#[test]
fn neighbours_share_at_most_overlap() {
    let text = (0..300)
        .map(|i| format!("t{i}"))
        .collect::<Vec<_>>()
        .join(" ");

    let chunks = chunk_text(&text, None, &config(60, 15)).expect("chunking should succeed");

    assert!(chunks.len() > 2);
    for pair in chunks.windows(2) {
        let shared = shared_edge(&pair[0].text, &pair[1].text);
        assert!(shared <= 15, "{shared} shared characters between neighbours");
    }
}

#[test]
fn unicode_is_measured_in_characters() {
    let text = "Привет мир ".repeat(8);
    let text = text.trim();
    assert!(text.len() > 100);
    assert!(char_len(text) < 100);

    let chunks = chunk_text(text, None, &config(100, 10)).expect("chunking should succeed");

    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].text, text);
}

#[test]
fn oversized_word_is_split_into_windows() {
    let word = "x".repeat(250);

    let chunks = chunk_text(&word, None, &config(100, 0)).expect("chunking should succeed");

    assert_eq!(chunks.len(), 3);
    let rebuilt: String = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
    assert_eq!(rebuilt, word);
}

#[test]
fn window_strategy_advances_by_target_minus_overlap() {
    let text = "abcdefghij".repeat(25);
    let config = ChunkingConfig {
        target_size: 100,
        overlap: 20,
        strategy: ChunkingStrategy::Window,
    };

    let chunks = chunk_text(&text, Some("w.txt"), &config).expect("chunking should succeed");

    assert_eq!(chunks.len(), 3);
    assert_eq!(char_len(&chunks[0].text), 100);
    assert_eq!(char_len(&chunks[2].text), 90);

    let mut rebuilt = chunks[0].text.clone();
    for chunk in &chunks[1..] {
        rebuilt.extend(chunk.text.chars().skip(20));
    }
    assert_eq!(rebuilt, text);
}

#[test]
fn indices_are_sequential_from_zero() {
    let text = (0..12)
        .map(|i| format!("Paragraph {i} has a handful of words in it."))
        .collect::<Vec<_>>()
        .join("\n\n");

    let chunks = chunk_text(&text, Some("seq"), &config(120, 30)).expect("chunking should succeed");

    assert!(chunks.len() > 1);
    for (expected, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.index, expected);
        assert_eq!(chunk.source_title.as_deref(), Some("seq"));
        assert!(!chunk.text.trim().is_empty());
    }
}

#[test]
fn strategy_deserializes_lowercase() {
    let config: ChunkingConfig =
        toml::from_str("target_size = 500\nstrategy = \"window\"").expect("valid toml");

    assert_eq!(config.target_size, 500);
    assert_eq!(config.overlap, 200);
    assert_eq!(config.strategy, ChunkingStrategy::Window);
}
