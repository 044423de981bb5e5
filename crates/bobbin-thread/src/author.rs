use std::collections::HashMap;
use std::sync::Arc;

use bobbin_types::{Author, Record};

/// The author a thread is attributed to, if any.
///
/// A thread belongs to an author when that author wrote strictly more of it
/// than anyone else and holds at least half as many records as there are
/// distinct participants. Anything else is a conversation and has no
/// author.
pub fn thread_author(records: &[Record]) -> Option<Arc<Author>> {
    let mut counts: HashMap<&str, (usize, &Arc<Author>)> = HashMap::new();
    for record in records {
        counts
            .entry(record.author.id.as_str())
            .or_insert((0, &record.author))
            .0 += 1;
    }

    let participants = counts.len();
    let mut ranked: Vec<_> = counts.into_values().collect();
    ranked.sort_by(|a, b| b.0.cmp(&a.0));

    match ranked.as_slice() {
        [] => None,
        [(_, only)] => Some(Arc::clone(only)),
        [(top, author), (runner_up, _), ..] => {
            (top > runner_up && top * 2 >= participants).then(|| Arc::clone(author))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(authors: &[&Arc<Author>]) -> Vec<Record> {
        authors
            .iter()
            .enumerate()
            .map(|(n, author)| Record::root(n.to_string(), Arc::clone(author)))
            .collect()
    }

    fn people() -> (Arc<Author>, Arc<Author>, Arc<Author>) {
        (
            Arc::new(Author::new("1", "ann", "Ann")),
            Arc::new(Author::new("2", "bob", "Bob")),
            Arc::new(Author::new("3", "cat", "Cat")),
        )
    }

    #[test]
    fn empty_thread_has_no_author() {
        assert!(thread_author(&[]).is_none());
    }

    #[test]
    fn single_author_owns_the_thread() {
        let (ann, _, _) = people();
        let owner = thread_author(&thread(&[&ann, &ann, &ann])).unwrap();
        assert_eq!(owner.handle, "ann");
    }

    #[test]
    fn clear_majority_owns_the_thread() {
        let (ann, bob, cat) = people();
        let owner = thread_author(&thread(&[&ann, &bob, &ann, &cat, &ann])).unwrap();
        assert_eq!(owner.handle, "ann");
    }

    #[test]
    fn tie_is_a_conversation() {
        let (ann, bob, _) = people();
        assert!(thread_author(&thread(&[&ann, &bob, &ann, &bob])).is_none());
    }

    #[test]
    fn many_participants_is_a_conversation() {
        let (ann, bob, cat) = people();
        let dan = Arc::new(Author::new("4", "dan", "Dan"));
        let eve = Arc::new(Author::new("5", "eve", "Eve"));
        // ann leads with 2, but 2 * 2 < 5 participants.
        assert!(thread_author(&thread(&[&ann, &bob, &ann, &cat, &dan, &eve])).is_none());
    }
}
