//! Byte-level SQL scanning shared by the analyzer and the rewriter.
//!
//! The scanner walks an ASCII-uppercased copy of the query, skipping string
//! literals, quoted identifiers and comments while tracking parenthesis
//! depth. Uppercasing is ASCII-only, so every offset reported here is also a
//! valid byte offset (and char boundary) in the original text.

/// Multi-word keyword phrases, matched with arbitrary whitespace between words.
pub(crate) const FROM: &[&[u8]] = &[b"FROM"];
pub(crate) const ORDER_BY: &[&[u8]] = &[b"ORDER", b"BY"];
pub(crate) const GROUP_BY: &[&[u8]] = &[b"GROUP", b"BY"];
pub(crate) const HAVING: &[&[u8]] = &[b"HAVING"];
pub(crate) const LIMIT: &[&[u8]] = &[b"LIMIT"];
pub(crate) const WINDOW: &[&[u8]] = &[b"WINDOW"];

fn is_ident_byte(b: u8) -> bool {
   b.is_ascii_alphanumeric() || b == b'_'
}

/// Match a keyword phrase starting at position `i` of the uppercased `bytes`.
///
/// "Standalone" means the character before and after the phrase (if present)
/// is not an identifier character (`[A-Z0-9_]`). Words of a phrase may be
/// separated by any run of whitespace. Returns the end offset of the phrase.
pub(crate) fn match_keyword(bytes: &[u8], i: usize, words: &[&[u8]]) -> Option<usize> {
   let len = bytes.len();
   if i > 0 && is_ident_byte(bytes[i - 1]) {
      return None;
   }

   let mut j = i;
   for (n, word) in words.iter().enumerate() {
      if n > 0 {
         let gap = j;
         while j < len && bytes[j].is_ascii_whitespace() {
            j += 1;
         }
         if j == gap {
            return None;
         }
      }
      let end = j + word.len();
      if end > len || &bytes[j..end] != *word {
         return None;
      }
      j = end;
   }

   if j < len && is_ident_byte(bytes[j]) {
      return None;
   }
   Some(j)
}

/// Advance the scanner index past a quoted literal or identifier.
///
/// `quote` is the opening quote character (`'`, `"` or `` ` ``). The scanner
/// handles SQL-standard doubled-quote escaping (`''` or `""`).
fn skip_quoted(bytes: &[u8], len: usize, i: usize, quote: u8) -> usize {
   let mut j = i + 1;
   while j < len {
      if bytes[j] == quote {
         // Doubled quote is an escape, skip both
         if j + 1 < len && bytes[j + 1] == quote {
            j += 2;
            continue;
         }
         return j;
      }
      j += 1;
   }
   j // unterminated, return end
}

/// Advance the scanner index past a `--` line comment (until newline or end).
fn skip_line_comment(bytes: &[u8], len: usize, i: usize) -> usize {
   let mut j = i + 2; // skip the `--`
   while j < len && bytes[j] != b'\n' {
      j += 1;
   }
   j
}

/// Advance the scanner index past a `/* … */` block comment.
fn skip_block_comment(bytes: &[u8], len: usize, i: usize) -> usize {
   let mut j = i + 2; // skip the `/*`
   while j + 1 < len {
      if bytes[j] == b'*' && bytes[j + 1] == b'/' {
         return j + 1; // position of the closing `/`
      }
      j += 1;
   }
   len.saturating_sub(1) // unterminated, return end
}

/// Offset of the first byte that is neither whitespace nor part of a leading
/// comment.
pub(crate) fn skip_leading_trivia(query: &str) -> usize {
   let bytes = query.as_bytes();
   let len = bytes.len();
   let mut i = 0;

   loop {
      while i < len && bytes[i].is_ascii_whitespace() {
         i += 1;
      }
      if i + 1 < len && bytes[i] == b'-' && bytes[i + 1] == b'-' {
         i = (skip_line_comment(bytes, len, i) + 1).min(len);
         continue;
      }
      if i + 1 < len && bytes[i] == b'/' && bytes[i + 1] == b'*' {
         i = (skip_block_comment(bytes, len, i) + 1).min(len);
         continue;
      }
      return i;
   }
}

/// Scan the uppercased query, calling `visit` for every byte outside quotes
/// and comments.
///
/// `visit` receives `(uppercased_bytes, position, depth)` where `depth` is the
/// parenthesis depth *before* the byte at `position` is applied: an opening
/// `(` is reported at the outer depth and its matching `)` at the inner one.
/// Returning `Some(T)` short-circuits the scan.
pub(crate) fn scan_code<T>(
   query: &str,
   mut visit: impl FnMut(&[u8], usize, i32) -> Option<T>,
) -> Option<T> {
   let upper = query.to_ascii_uppercase();
   let bytes = upper.as_bytes();
   let len = bytes.len();
   let mut depth: i32 = 0;
   let mut i = 0;

   while i < len {
      match bytes[i] {
         // Quoted literal or identifier (with doubled-quote escape handling)
         quote @ (b'\'' | b'"' | b'`') => {
            i = skip_quoted(bytes, len, i, quote);
         }
         // Line comment: --
         b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
            i = skip_line_comment(bytes, len, i);
         }
         // Block comment: /* ... */
         b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
            i = skip_block_comment(bytes, len, i);
         }
         b => {
            if let Some(result) = visit(bytes, i, depth) {
               return Some(result);
            }
            match b {
               b'(' => depth += 1,
               b')' => depth -= 1,
               _ => {}
            }
         }
      }
      i += 1;
   }

   None
}

/// Scan the uppercased query, calling `on_keyword` at each top-level position
/// (depth == 0, outside quotes, comments and parentheses).
pub(crate) fn scan_top_level<T>(
   query: &str,
   mut on_keyword: impl FnMut(&[u8], usize) -> Option<T>,
) -> Option<T> {
   scan_code(query, |bytes, i, depth| {
      if depth == 0 && bytes[i] != b'(' {
         on_keyword(bytes, i)
      } else {
         None
      }
   })
}

/// Byte span `(start, end)` of the first top-level occurrence of a phrase.
pub(crate) fn first_top_level(query: &str, words: &[&[u8]]) -> Option<(usize, usize)> {
   scan_top_level(query, |bytes, i| match_keyword(bytes, i, words).map(|end| (i, end)))
}

/// Byte span `(start, end)` of the last top-level occurrence of a phrase.
pub(crate) fn last_top_level(query: &str, words: &[&[u8]]) -> Option<(usize, usize)> {
   let mut found = None;
   scan_top_level(query, |bytes, i| {
      if let Some(end) = match_keyword(bytes, i, words) {
         found = Some((i, end));
      }
      None::<()>
   });
   found
}

/// Split on top-level commas, trimming each part.
pub(crate) fn split_top_level_commas(query: &str) -> Vec<&str> {
   let mut commas = Vec::new();
   scan_top_level(query, |bytes, i| {
      if bytes[i] == b',' {
         commas.push(i);
      }
      None::<()>
   });

   let mut parts = Vec::with_capacity(commas.len() + 1);
   let mut start = 0;
   for comma in commas {
      parts.push(query[start..comma].trim());
      start = comma + 1;
   }
   parts.push(query[start..].trim());
   parts
}
