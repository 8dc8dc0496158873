//! Byte-payload adapters.
//!
//! The crate does not ship a serialization format. A [`Decoder`] or [`Encoder`] supplies
//! one, and [`Decode`]/[`Encode`] run it as an ordinary 1:1 operator: a payload that
//! fails to convert cancels upstream and fails the stream with the converted error.

use std::{marker::PhantomData, str::Utf8Error, sync::Arc};

use crate::{
    operator::transform::{self, Step, Transform},
    Completion, Publisher, Subscriber,
};

/// Turns a byte payload into a value.
pub trait Decoder<T>: Send + Sync + 'static {
    type Error;

    fn decode(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}

/// Turns a value into a byte payload.
pub trait Encoder<T>: Send + Sync + 'static {
    type Error;

    fn encode(&self, value: &T) -> Result<Vec<u8>, Self::Error>;
}

/// UTF-8 text codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct Utf8;

impl Decoder<String> for Utf8 {
    type Error = Utf8Error;

    fn decode(&self, bytes: &[u8]) -> Result<String, Utf8Error> {
        std::str::from_utf8(bytes).map(str::to_owned)
    }
}

impl Encoder<String> for Utf8 {
    type Error = std::convert::Infallible;

    fn encode(&self, value: &String) -> Result<Vec<u8>, Self::Error> {
        Ok(value.as_bytes().to_vec())
    }
}

/// Decodes every upstream payload.
pub struct Decode<U, D, T> {
    upstream: U,
    decoder: Arc<D>,
    _output: PhantomData<fn() -> T>,
}

impl<U, D, T> Decode<U, D, T> {
    pub(crate) fn new(upstream: U, decoder: D) -> Self {
        Self {
            upstream,
            decoder: Arc::new(decoder),
            _output: PhantomData,
        }
    }
}

impl<U, D, T> Publisher for Decode<U, D, T>
where
    U: Publisher,
    U::Output: AsRef<[u8]>,
    U::Failure: From<<D as Decoder<T>>::Error>,
    D: Decoder<T>,
    T: Send + 'static,
{
    type Output = T;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = T, Failure = U::Failure>,
    {
        let step = CodecStep {
            codec: self.decoder.clone(),
            convert: |decoder: &D, bytes: U::Output| -> Result<T, U::Failure> {
                Ok(decoder.decode(bytes.as_ref())?)
            },
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

/// Encodes every upstream value.
pub struct Encode<U, C> {
    upstream: U,
    encoder: Arc<C>,
}

impl<U, C> Encode<U, C> {
    pub(crate) fn new(upstream: U, encoder: C) -> Self {
        Self {
            upstream,
            encoder: Arc::new(encoder),
        }
    }
}

impl<U, C> Publisher for Encode<U, C>
where
    U: Publisher,
    U::Failure: From<<C as Encoder<U::Output>>::Error>,
    C: Encoder<U::Output>,
{
    type Output = Vec<u8>;
    type Failure = U::Failure;

    fn receive<S>(&self, subscriber: S)
    where
        S: Subscriber<Input = Vec<u8>, Failure = U::Failure>,
    {
        let step = CodecStep {
            codec: self.encoder.clone(),
            convert: |encoder: &C, value: U::Output| -> Result<Vec<u8>, U::Failure> {
                Ok(encoder.encode(&value)?)
            },
            _types: PhantomData,
        };
        transform::attach(&self.upstream, step, subscriber)
    }
}

struct CodecStep<C, I, T, E, V> {
    codec: Arc<C>,
    convert: V,
    _types: PhantomData<fn(I) -> (T, E)>,
}

impl<C, I, T, E, V> Transform for CodecStep<C, I, T, E, V>
where
    C: Send + Sync + 'static,
    I: Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
    V: Fn(&C, I) -> Result<T, E> + Send + 'static,
{
    type Input = I;
    type Output = T;
    type UpstreamFailure = E;
    type Failure = E;

    fn transform(&mut self, input: I) -> Step<T, E> {
        match (self.convert)(&self.codec, input) {
            Ok(output) => Step::Emit(output),
            Err(failure) => Step::Fail(failure),
        }
    }

    fn complete(&mut self, completion: Completion<E>) -> Completion<E> {
        completion
    }
}
