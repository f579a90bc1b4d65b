use serde::Deserialize;
use serde::Serialize;
use validator::ValidateEmail;

/// A validated email address. Used for both the `from` sender and each `to`
/// recipient of a mail request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress(String);

impl EmailAddress {
    pub fn parse(email: String) -> Result<Self, String> {
        ValidateEmail::validate_email(&email)
            .then_some(Self(email.clone()))
            .ok_or(format!("Invalid email: {email:?}"))
    }
}

impl AsRef<str> for EmailAddress {
    fn as_ref(&self) -> &str { &self.0 }
}

impl std::fmt::Display for EmailAddress {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use claims::assert_err;
    use fake::faker::internet::en::SafeEmail;
    use fake::Fake;
    use quickcheck::Arbitrary;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::domain::EmailAddress;

    // property-based testing greatly increases the range of inputs to be validated,
    // but is still not exhaustive. `fake` is used to generate random emails,
    // `quickcheck` is used to test random inputs in bulk (100 by default)

    #[derive(Clone, Debug)]
    struct TestEmail(pub String);

    impl Arbitrary for TestEmail {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            let mut rng = StdRng::seed_from_u64(u64::arbitrary(g));
            Self(SafeEmail().fake_with_rng(&mut rng))
        }
    }

    #[quickcheck_macros::quickcheck]
    fn email_ok(email: TestEmail) -> bool { EmailAddress::parse(email.0).is_ok() }

    #[test]
    fn empty() {
        assert_err!(EmailAddress::parse("".to_string()));
    }

    #[test]
    fn no_at() {
        assert_err!(EmailAddress::parse("johnfoo.com".to_string()));
    }

    #[test]
    fn no_subject() {
        assert_err!(EmailAddress::parse("@foo.com".to_string()));
    }
}
