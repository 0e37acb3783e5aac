//! Product version labels.

use rand::seq::SliceRandom;
use rand::Rng;

/// Longest label the product's about box can show.
pub const MAX_QUOTE_LEN: usize = 155;

pub const QUOTES: [&str; 25] = [
    "It's not that I'm so smart, it's just that I stay with problems longer.",
    "Ignorance is the curse of God; knowledge is the wing wherewith we fly to heaven.",
    "Software built on pride and love of subject is superior to software built for profit.",
    "If developers' pains are Java and .NET, the antidote is dynamic languages and frameworks.",
    "Software is like sex: it's better when it's free.",
    "The ultimate search engine would basically understand everything in the world, and it would always give you the right thing.",
    "Mathematics is the queen of the sciences and number theory is the queen of mathematics.",
    "Computer science is no more about computers than astronomy is about telescopes.",
    "They don't make bugs like Bunny anymore.",
    "Don't worry if it doesn't work right. If everything did, you'd be out of a job.",
    "It is not enough for code to work.",
    "This software rocks!",
    "If you aren't happy with this world, change it.",
    "This software will stop in 3 minutes...",
    "Premature optimization is the root of all evil.",
    "Low-level programming is good for the programmer's soul.",
    "It's nice to have a game that sells a million copies.",
    "It's time to kick ass and chew bubble gum, and I'm all outta gum!",
    "When something is important enough, you do it even if the odds are not in your favor.",
    "Great companies are built on great products.",
    "I think it matters whether someone has a good heart.",
    "You found a bug? Look right... Look left... If no one else saw it happens, proceed! -- A lazy QA",
    "Nine people can't make a baby in a month.",
    "There are only two kinds of languages: the ones people complain about and the ones nobody uses",
    "The answer to life the universe and everything equals 101010",
];

/// A random quote.
pub fn pick() -> &'static str {
    pick_with(&mut rand::thread_rng())
}

pub fn pick_with<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    QUOTES.choose(rng).copied().unwrap_or(QUOTES[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_quotes_fit_the_label() {
        for quote in QUOTES {
            assert!(quote.len() <= MAX_QUOTE_LEN, "too long: {quote}");
        }
    }

    #[test]
    fn test_pick_is_from_the_list() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            assert!(QUOTES.contains(&pick_with(&mut rng)));
        }
        assert!(QUOTES.contains(&pick()));
    }
}
